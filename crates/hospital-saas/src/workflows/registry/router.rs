use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::domain::{DepartmentDraft, PatientDraft};
use super::service::RegistryService;
use crate::http::{now, CurrentUser, HospitalQuery};
use crate::ids::{DepartmentId, HospitalId};
use crate::store::HospitalStore;
use crate::tenancy::{AdminDraft, HospitalDraft};
use crate::workflows::ServiceError;

/// Wizard payload. Unknown keys at either level are rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WizardRequest {
    pub hospital_data: HospitalDraft,
    #[serde(default)]
    pub admin_data: Option<AdminDraft>,
}

pub fn registry_router<S>(service: Arc<RegistryService<S>>) -> Router
where
    S: HospitalStore + 'static,
{
    Router::new()
        .route("/api/v1/hospitals", get(summary_handler::<S>))
        .route("/api/v1/hospitals/wizard", post(wizard_handler::<S>))
        .route("/api/v1/hospitals/:hospital/stats", get(stats_handler::<S>))
        .route(
            "/api/v1/hospitals/:hospital/departments",
            get(departments_handler::<S>),
        )
        .route("/api/v1/departments", post(create_department_handler::<S>))
        .route(
            "/api/v1/departments/:department/stats",
            get(department_stats_handler::<S>),
        )
        .route(
            "/api/v1/patients",
            get(list_patients_handler::<S>).post(register_patient_handler::<S>),
        )
        .with_state(service)
}

pub(crate) async fn wizard_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<WizardRequest>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let outcome = service.create_hospital_wizard(
        &principal,
        request.hospital_data,
        request.admin_data,
        now(),
    )?;
    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}

pub(crate) async fn summary_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let hospitals = service.all_hospitals_summary(&principal)?;
    Ok((StatusCode::OK, Json(hospitals)).into_response())
}

pub(crate) async fn stats_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(hospital): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let stats = service.hospital_stats(&principal, &HospitalId::new(hospital), now().date())?;
    Ok((StatusCode::OK, Json(stats)).into_response())
}

pub(crate) async fn departments_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(hospital): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let departments = service.departments_by_hospital(&principal, &HospitalId::new(hospital))?;
    Ok((StatusCode::OK, Json(departments)).into_response())
}

pub(crate) async fn create_department_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(draft): Json<DepartmentDraft>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let department = service.create_department(&principal, draft)?;
    Ok((StatusCode::CREATED, Json(department)).into_response())
}

pub(crate) async fn department_stats_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(department): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let stats =
        service.department_stats(&principal, &DepartmentId::new(department), now().date())?;
    Ok((StatusCode::OK, Json(stats)).into_response())
}

pub(crate) async fn register_patient_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(draft): Json<PatientDraft>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let patient = service.register_patient(&principal, draft, now())?;
    Ok((StatusCode::CREATED, Json(patient)).into_response())
}

pub(crate) async fn list_patients_handler<S>(
    State(service): State<Arc<RegistryService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<HospitalQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let patients = service.list_patients(&principal, query.hospital)?;
    Ok((StatusCode::OK, Json(patients)).into_response())
}
