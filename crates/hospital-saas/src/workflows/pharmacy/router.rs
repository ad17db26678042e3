use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::domain::{MedicationDraft, PharmacyDraft, PrescriptionRequest};
use super::service::PharmacyService;
use crate::http::{now, CurrentUser, HospitalQuery};
use crate::ids::{HospitalId, PharmacyId, PrescriptionId};
use crate::store::HospitalStore;
use crate::workflows::ServiceError;

#[derive(Debug, Default, Deserialize)]
pub struct PharmacyQueueQuery {
    #[serde(default)]
    pub pharmacy: Option<PharmacyId>,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

pub fn pharmacy_router<S>(service: Arc<PharmacyService<S>>) -> Router
where
    S: HospitalStore + 'static,
{
    Router::new()
        .route("/api/v1/pharmacy/queue", get(queue_handler::<S>))
        .route("/api/v1/pharmacy/pharmacies", post(register_handler::<S>))
        .route(
            "/api/v1/pharmacy/pharmacies/default",
            get(default_pharmacy_handler::<S>),
        )
        .route("/api/v1/pharmacy/medications", post(medication_handler::<S>))
        .route("/api/v1/pharmacy/prescriptions", post(create_handler::<S>))
        .route(
            "/api/v1/pharmacy/prescriptions/:prescription/submit",
            post(submit_handler::<S>),
        )
        .route(
            "/api/v1/pharmacy/prescriptions/:prescription/cancel",
            post(cancel_handler::<S>),
        )
        .route(
            "/api/v1/pharmacy/prescriptions/:prescription/dispense",
            post(dispense_handler::<S>),
        )
        .with_state(service)
}

pub(crate) async fn queue_handler<S>(
    State(service): State<Arc<PharmacyService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PharmacyQueueQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let queue = service.pharmacy_queue(&principal, query.pharmacy.as_ref(), query.hospital)?;
    Ok((StatusCode::OK, Json(queue)).into_response())
}

pub(crate) async fn register_handler<S>(
    State(service): State<Arc<PharmacyService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(draft): Json<PharmacyDraft>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let pharmacy = service.register_pharmacy(&principal, draft)?;
    Ok((StatusCode::CREATED, Json(pharmacy)).into_response())
}

pub(crate) async fn default_pharmacy_handler<S>(
    State(service): State<Arc<PharmacyService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<HospitalQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    service.principal(&user)?;
    let pharmacy = service.default_pharmacy(query.hospital.as_ref())?;
    Ok((StatusCode::OK, Json(pharmacy)).into_response())
}

pub(crate) async fn medication_handler<S>(
    State(service): State<Arc<PharmacyService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(draft): Json<MedicationDraft>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let medication = service.add_medication(&principal, draft)?;
    Ok((StatusCode::CREATED, Json(medication)).into_response())
}

pub(crate) async fn create_handler<S>(
    State(service): State<Arc<PharmacyService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<PrescriptionRequest>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let prescription = service.create_prescription(&principal, request, now())?;
    Ok((StatusCode::CREATED, Json(prescription)).into_response())
}

pub(crate) async fn submit_handler<S>(
    State(service): State<Arc<PharmacyService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(prescription): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let prescription =
        service.submit_prescription(&principal, &PrescriptionId::new(prescription))?;
    Ok((StatusCode::OK, Json(prescription)).into_response())
}

pub(crate) async fn cancel_handler<S>(
    State(service): State<Arc<PharmacyService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(prescription): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let prescription =
        service.cancel_prescription(&principal, &PrescriptionId::new(prescription))?;
    Ok((StatusCode::OK, Json(prescription)).into_response())
}

pub(crate) async fn dispense_handler<S>(
    State(service): State<Arc<PharmacyService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(prescription): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let outcome =
        service.dispense_all(&principal, &PrescriptionId::new(prescription), now())?;
    Ok((StatusCode::OK, Json(outcome)).into_response())
}
