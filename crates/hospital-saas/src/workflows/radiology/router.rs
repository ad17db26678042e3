use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::domain::{ExaminationTypeDraft, OrderRequest, ResultFindings, ScheduleRequest};
use super::report::{rows_to_csv, ReportFilters};
use super::service::RadiologyService;
use crate::http::{now, CurrentUser, HospitalQuery};
use crate::ids::{PatientId, RadiologyOrderId, RadiologyResultId};
use crate::store::HospitalStore;
use crate::workflows::lab::RangeQuery;
use crate::workflows::ServiceError;

#[derive(Debug, Deserialize)]
pub struct OrderStatusBody {
    pub status: String,
}

/// Radiology endpoints. The department queue is open to guests.
pub fn radiology_router<S>(service: Arc<RadiologyService<S>>) -> Router
where
    S: HospitalStore + 'static,
{
    Router::new()
        .route("/api/v1/radiology/queue", get(queue_handler::<S>))
        .route("/api/v1/radiology/queue/today", get(today_queue_handler::<S>))
        .route(
            "/api/v1/radiology/examination-types",
            post(examination_type_handler::<S>),
        )
        .route("/api/v1/radiology/orders", post(create_order_handler::<S>))
        .route(
            "/api/v1/radiology/orders/:order/submit",
            post(submit_order_handler::<S>),
        )
        .route(
            "/api/v1/radiology/orders/:order/cancel",
            post(cancel_order_handler::<S>),
        )
        .route(
            "/api/v1/radiology/orders/:order/status",
            post(order_status_handler::<S>),
        )
        .route(
            "/api/v1/radiology/orders/:order/schedule",
            post(schedule_handler::<S>),
        )
        .route(
            "/api/v1/radiology/orders/:order/start",
            post(start_examination_handler::<S>),
        )
        .route(
            "/api/v1/radiology/orders/:order/results",
            post(create_result_handler::<S>),
        )
        .route(
            "/api/v1/radiology/results/:result/submit",
            post(submit_result_handler::<S>),
        )
        .route(
            "/api/v1/radiology/results/:result/cancel",
            post(cancel_result_handler::<S>),
        )
        .route(
            "/api/v1/radiology/results/:result/approve",
            post(approve_result_handler::<S>),
        )
        .route("/api/v1/radiology/statistics", get(statistics_handler::<S>))
        .route(
            "/api/v1/radiology/patients/:patient/history",
            get(history_handler::<S>),
        )
        .route("/api/v1/radiology/reports/orders", get(report_handler::<S>))
        .route(
            "/api/v1/radiology/reports/orders.csv",
            get(report_csv_handler::<S>),
        )
        .with_state(service)
}

pub(crate) async fn queue_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    Query(query): Query<HospitalQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let queue = service.radiology_queue(query.hospital.as_ref())?;
    Ok((StatusCode::OK, Json(queue)).into_response())
}

pub(crate) async fn today_queue_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<HospitalQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let queue = service.today_queue(&principal, query.hospital, now().date())?;
    Ok((StatusCode::OK, Json(queue)).into_response())
}

pub(crate) async fn examination_type_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(draft): Json<ExaminationTypeDraft>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let examination = service.add_examination_type(&principal, draft)?;
    Ok((StatusCode::CREATED, Json(examination)).into_response())
}

pub(crate) async fn create_order_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<OrderRequest>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let order = service.create_order(&principal, request, now())?;
    Ok((StatusCode::CREATED, Json(order)).into_response())
}

pub(crate) async fn submit_order_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(order): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let order = service.submit_order(&principal, &RadiologyOrderId::new(order))?;
    Ok((StatusCode::OK, Json(order)).into_response())
}

pub(crate) async fn cancel_order_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(order): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let order = service.cancel_order(&principal, &RadiologyOrderId::new(order))?;
    Ok((StatusCode::OK, Json(order)).into_response())
}

pub(crate) async fn order_status_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(order): Path<String>,
    Json(body): Json<OrderStatusBody>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let update =
        service.update_order_status(&principal, &RadiologyOrderId::new(order), &body.status)?;
    Ok((StatusCode::OK, Json(update)).into_response())
}

pub(crate) async fn schedule_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(order): Path<String>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let ack = service.schedule_order(&principal, &RadiologyOrderId::new(order), request)?;
    Ok((StatusCode::OK, Json(ack)).into_response())
}

pub(crate) async fn start_examination_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(order): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let update = service.start_examination(&principal, &RadiologyOrderId::new(order))?;
    Ok((StatusCode::OK, Json(update)).into_response())
}

pub(crate) async fn create_result_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(order): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let result = service.create_result(&principal, &RadiologyOrderId::new(order), now())?;
    Ok((StatusCode::CREATED, Json(result)).into_response())
}

pub(crate) async fn submit_result_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(result): Path<String>,
    Json(findings): Json<ResultFindings>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let result =
        service.submit_result(&principal, &RadiologyResultId::new(result), findings, now())?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

pub(crate) async fn cancel_result_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(result): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let result = service.cancel_result(&principal, &RadiologyResultId::new(result))?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

pub(crate) async fn approve_result_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(result): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let ack = service.approve_result(&principal, &RadiologyResultId::new(result), now())?;
    Ok((StatusCode::OK, Json(ack)).into_response())
}

pub(crate) async fn statistics_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<RangeQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let stats = service.statistics(
        &principal,
        query.hospital,
        query.from_date,
        query.to_date,
        now().date(),
    )?;
    Ok((StatusCode::OK, Json(stats)).into_response())
}

pub(crate) async fn history_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(patient): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let history = service.patient_history(&principal, &PatientId::new(patient))?;
    Ok((StatusCode::OK, Json(history)).into_response())
}

pub(crate) async fn report_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(filters): Query<ReportFilters>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let report = service.orders_report(&principal, &filters)?;
    Ok((StatusCode::OK, Json(report)).into_response())
}

pub(crate) async fn report_csv_handler<S>(
    State(service): State<Arc<RadiologyService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(filters): Query<ReportFilters>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let report = service.orders_report(&principal, &filters)?;
    let body = rows_to_csv(&report.data)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        body,
    )
        .into_response())
}
