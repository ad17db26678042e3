use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::domain::{AdmissionRequest, DischargeRequest};
use super::service::IpdService;
use crate::http::{now, CurrentUser, HospitalQuery};
use crate::ids::AdmissionId;
use crate::store::HospitalStore;
use crate::workflows::ServiceError;

#[derive(Debug, Deserialize)]
pub struct AdvanceBody {
    pub amount: f64,
    #[serde(default = "AdvanceBody::cash")]
    pub mode_of_payment: String,
}

impl AdvanceBody {
    fn cash() -> String {
        "Cash".to_string()
    }
}

#[derive(Debug, Deserialize)]
pub struct BillingBody {
    pub amount: f64,
}

pub fn ipd_router<S>(service: Arc<IpdService<S>>) -> Router
where
    S: HospitalStore + 'static,
{
    Router::new()
        .route("/api/v1/ipd/admissions", post(admit_handler::<S>))
        .route("/api/v1/ipd/admissions/active", get(active_handler::<S>))
        .route(
            "/api/v1/ipd/admissions/:admission/treatment",
            post(treatment_handler::<S>),
        )
        .route(
            "/api/v1/ipd/admissions/:admission/discharge",
            post(discharge_handler::<S>),
        )
        .route(
            "/api/v1/ipd/admissions/:admission/advance",
            post(advance_handler::<S>),
        )
        .route(
            "/api/v1/ipd/admissions/:admission/billing",
            post(billing_handler::<S>),
        )
        .route("/api/v1/ipd/dashboard", get(dashboard_handler::<S>))
        .with_state(service)
}

pub(crate) async fn admit_handler<S>(
    State(service): State<Arc<IpdService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<AdmissionRequest>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let admission = service.admit(&principal, request, now())?;
    Ok((StatusCode::CREATED, Json(admission)).into_response())
}

pub(crate) async fn active_handler<S>(
    State(service): State<Arc<IpdService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<HospitalQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let admissions = service.active_admissions(&principal, query.hospital)?;
    Ok((StatusCode::OK, Json(admissions)).into_response())
}

pub(crate) async fn treatment_handler<S>(
    State(service): State<Arc<IpdService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(admission): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let admission = service.start_treatment(&principal, &AdmissionId::new(admission))?;
    Ok((StatusCode::OK, Json(admission)).into_response())
}

pub(crate) async fn discharge_handler<S>(
    State(service): State<Arc<IpdService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(admission): Path<String>,
    Json(request): Json<DischargeRequest>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let outcome = service.discharge(&principal, &AdmissionId::new(admission), request, now())?;
    Ok((StatusCode::OK, Json(outcome)).into_response())
}

pub(crate) async fn advance_handler<S>(
    State(service): State<Arc<IpdService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(admission): Path<String>,
    Json(body): Json<AdvanceBody>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let receipt = service.add_advance_payment(
        &principal,
        &AdmissionId::new(admission),
        body.amount,
        &body.mode_of_payment,
    )?;
    Ok((StatusCode::OK, Json(receipt)).into_response())
}

pub(crate) async fn billing_handler<S>(
    State(service): State<Arc<IpdService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(admission): Path<String>,
    Json(body): Json<BillingBody>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let update = service.update_billing(&principal, &AdmissionId::new(admission), body.amount)?;
    Ok((StatusCode::OK, Json(update)).into_response())
}

pub(crate) async fn dashboard_handler<S>(
    State(service): State<Arc<IpdService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<HospitalQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let dashboard = service.ipd_dashboard(&principal, query.hospital)?;
    Ok((StatusCode::OK, Json(dashboard)).into_response())
}
