use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use super::domain::AppointmentRequest;
use super::service::AppointmentService;
use crate::http::{now, CurrentUser};
use crate::ids::AppointmentId;
use crate::store::HospitalStore;
use crate::workflows::ServiceError;

pub fn appointment_router<S>(service: Arc<AppointmentService<S>>) -> Router
where
    S: HospitalStore + 'static,
{
    Router::new()
        .route("/api/v1/appointments", post(book_handler::<S>))
        .route(
            "/api/v1/appointments/:appointment/submit",
            post(submit_handler::<S>),
        )
        .route(
            "/api/v1/appointments/:appointment/cancel",
            post(cancel_handler::<S>),
        )
        .with_state(service)
}

pub(crate) async fn book_handler<S>(
    State(service): State<Arc<AppointmentService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<AppointmentRequest>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let appointment = service.book(&principal, request, now())?;
    Ok((StatusCode::CREATED, Json(appointment)).into_response())
}

pub(crate) async fn submit_handler<S>(
    State(service): State<Arc<AppointmentService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(appointment): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let appointment = service.submit(&principal, &AppointmentId::new(appointment))?;
    Ok((StatusCode::OK, Json(appointment)).into_response())
}

pub(crate) async fn cancel_handler<S>(
    State(service): State<Arc<AppointmentService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(appointment): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let appointment = service.cancel(&principal, &AppointmentId::new(appointment))?;
    Ok((StatusCode::OK, Json(appointment)).into_response())
}
