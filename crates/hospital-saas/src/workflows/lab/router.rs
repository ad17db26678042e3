use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

use super::domain::{LabTemplateDraft, LabTestRequest};
use super::service::LabService;
use crate::http::{now, CurrentUser, HospitalQuery};
use crate::ids::{HospitalId, LabTestId};
use crate::store::HospitalStore;
use crate::workflows::ServiceError;

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    #[serde(default)]
    pub hospital: Option<HospitalId>,
    #[serde(default)]
    pub from_date: Option<NaiveDate>,
    #[serde(default)]
    pub to_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct LabStatusBody {
    pub status: String,
}

pub fn lab_router<S>(service: Arc<LabService<S>>) -> Router
where
    S: HospitalStore + 'static,
{
    Router::new()
        .route("/api/v1/lab/queue", get(queue_handler::<S>))
        .route("/api/v1/lab/templates", post(template_handler::<S>))
        .route("/api/v1/lab/tests", post(create_handler::<S>))
        .route(
            "/api/v1/lab/tests/:test/queue-number",
            post(queue_number_handler::<S>),
        )
        .route("/api/v1/lab/tests/:test/status", post(status_handler::<S>))
        .route("/api/v1/lab/stats", get(stats_handler::<S>))
        .with_state(service)
}

pub(crate) async fn queue_handler<S>(
    State(service): State<Arc<LabService<S>>>,
    Query(query): Query<HospitalQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let board = service.lab_queue(query.hospital.as_ref(), now().date())?;
    Ok((StatusCode::OK, Json(board)).into_response())
}

pub(crate) async fn template_handler<S>(
    State(service): State<Arc<LabService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(draft): Json<LabTemplateDraft>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let template = service.add_template(&principal, draft)?;
    Ok((StatusCode::CREATED, Json(template)).into_response())
}

pub(crate) async fn create_handler<S>(
    State(service): State<Arc<LabService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<LabTestRequest>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let test = service.create_test(&principal, request, now())?;
    Ok((StatusCode::CREATED, Json(test)).into_response())
}

pub(crate) async fn queue_number_handler<S>(
    State(service): State<Arc<LabService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(test): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let assigned = service.assign_queue_number(&principal, &LabTestId::new(test), now())?;
    Ok((StatusCode::OK, Json(assigned)).into_response())
}

pub(crate) async fn status_handler<S>(
    State(service): State<Arc<LabService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(test): Path<String>,
    Json(body): Json<LabStatusBody>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let update = service.update_status(&principal, &LabTestId::new(test), &body.status, now())?;
    Ok((StatusCode::OK, Json(update)).into_response())
}

pub(crate) async fn stats_handler<S>(
    State(service): State<Arc<LabService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<RangeQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let today = now().date();
    let stats = service.lab_stats(
        &principal,
        query.hospital,
        query.from_date.unwrap_or(today),
        query.to_date.unwrap_or(today),
    )?;
    Ok((StatusCode::OK, Json(stats)).into_response())
}
