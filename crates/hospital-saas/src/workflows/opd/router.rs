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

use super::domain::TokenRequest;
use super::service::OpdService;
use crate::http::{now, CurrentUser, HospitalQuery};
use crate::ids::{HospitalId, PractitionerId, TokenId};
use crate::store::HospitalStore;
use crate::workflows::ServiceError;

#[derive(Debug, Default, Deserialize)]
pub struct NextNumberQuery {
    #[serde(default)]
    pub hospital: Option<HospitalId>,
    #[serde(default)]
    pub token_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

/// Outpatient queue endpoints. The two board routes are open to guests.
pub fn opd_router<S>(service: Arc<OpdService<S>>) -> Router
where
    S: HospitalStore + 'static,
{
    Router::new()
        .route("/api/v1/opd/queue-display", get(queue_display_handler::<S>))
        .route("/api/v1/opd/queue/:hospital", get(hospital_queue_handler::<S>))
        .route("/api/v1/opd/call-next", post(call_next_handler::<S>))
        .route("/api/v1/opd/tokens", post(generate_handler::<S>))
        .route("/api/v1/opd/tokens/next-number", get(next_number_handler::<S>))
        .route("/api/v1/opd/tokens/:token/status", post(status_handler::<S>))
        .route("/api/v1/opd/tokens/:token/call", post(call_patient_handler::<S>))
        .route("/api/v1/opd/tokens/:token/start", post(start_handler::<S>))
        .route("/api/v1/opd/tokens/:token/end", post(end_handler::<S>))
        .route(
            "/api/v1/opd/practitioners/:practitioner/tokens",
            get(practitioner_tokens_handler::<S>),
        )
        .with_state(service)
}

pub(crate) async fn queue_display_handler<S>(
    State(service): State<Arc<OpdService<S>>>,
    Query(query): Query<HospitalQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let board = service.queue_display(query.hospital.as_ref(), now().date())?;
    Ok((StatusCode::OK, Json(board)).into_response())
}

pub(crate) async fn hospital_queue_handler<S>(
    State(service): State<Arc<OpdService<S>>>,
    Path(hospital): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let hospital = HospitalId::new(hospital);
    let board = service.queue_display(Some(&hospital), now().date())?;
    Ok((StatusCode::OK, Json(board)).into_response())
}

pub(crate) async fn call_next_handler<S>(
    State(service): State<Arc<OpdService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<HospitalQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let outcome = service.call_next_token(&principal, query.hospital, now())?;
    Ok((StatusCode::OK, Json(outcome)).into_response())
}

pub(crate) async fn generate_handler<S>(
    State(service): State<Arc<OpdService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<TokenRequest>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let receipt = service.generate_token(&principal, request, now())?;
    Ok((StatusCode::CREATED, Json(receipt)).into_response())
}

pub(crate) async fn next_number_handler<S>(
    State(service): State<Arc<OpdService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<NextNumberQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let date = query.token_date.unwrap_or_else(|| now().date());
    let next = service.next_token_number(&principal, query.hospital, date)?;
    Ok((StatusCode::OK, Json(next)).into_response())
}

pub(crate) async fn status_handler<S>(
    State(service): State<Arc<OpdService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(token): Path<String>,
    Json(body): Json<StatusBody>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let update = service.update_status(&principal, &TokenId::new(token), &body.status, now())?;
    Ok((StatusCode::OK, Json(update)).into_response())
}

pub(crate) async fn call_patient_handler<S>(
    State(service): State<Arc<OpdService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(token): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let update = service.call_patient(&principal, &TokenId::new(token), now())?;
    Ok((StatusCode::OK, Json(update)).into_response())
}

pub(crate) async fn start_handler<S>(
    State(service): State<Arc<OpdService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(token): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let update = service.start_consultation(&principal, &TokenId::new(token), now())?;
    Ok((StatusCode::OK, Json(update)).into_response())
}

pub(crate) async fn end_handler<S>(
    State(service): State<Arc<OpdService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(token): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let update = service.end_consultation(&principal, &TokenId::new(token), now())?;
    Ok((StatusCode::OK, Json(update)).into_response())
}

pub(crate) async fn practitioner_tokens_handler<S>(
    State(service): State<Arc<OpdService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(practitioner): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let tokens = service.practitioner_tokens(
        &principal,
        &PractitionerId::new(practitioner),
        now().date(),
    )?;
    Ok((StatusCode::OK, Json(tokens)).into_response())
}
