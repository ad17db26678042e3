use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::domain::ConsultationInvoiceRequest;
use super::service::BillingService;
use crate::http::{now, CurrentUser};
use crate::ids::{HospitalId, InvoiceId, LabTestId, PrescriptionId, RadiologyOrderId};
use crate::store::HospitalStore;
use crate::workflows::lab::RangeQuery;
use crate::workflows::ServiceError;

/// Body for invoices derived from an existing clinical record.
#[derive(Debug, Deserialize)]
pub struct ReferenceInvoiceBody<Id> {
    pub reference: Id,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    pub amount: f64,
    #[serde(default = "cash")]
    pub mode_of_payment: String,
}

fn cash() -> String {
    "Cash".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct PendingQuery {
    #[serde(default)]
    pub hospital: Option<HospitalId>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub fn billing_router<S>(service: Arc<BillingService<S>>) -> Router
where
    S: HospitalStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/billing/invoices/consultation",
            post(consultation_handler::<S>),
        )
        .route("/api/v1/billing/invoices/lab", post(lab_handler::<S>))
        .route(
            "/api/v1/billing/invoices/radiology",
            post(radiology_handler::<S>),
        )
        .route(
            "/api/v1/billing/invoices/pharmacy",
            post(pharmacy_handler::<S>),
        )
        .route(
            "/api/v1/billing/invoices/:invoice/payments",
            post(payment_handler::<S>),
        )
        .route("/api/v1/billing/summary", get(summary_handler::<S>))
        .route("/api/v1/billing/pending", get(pending_handler::<S>))
        .with_state(service)
}

pub(crate) async fn consultation_handler<S>(
    State(service): State<Arc<BillingService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<ConsultationInvoiceRequest>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let receipt = service.create_consultation_invoice(&principal, request, now())?;
    Ok((StatusCode::CREATED, Json(receipt)).into_response())
}

pub(crate) async fn lab_handler<S>(
    State(service): State<Arc<BillingService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ReferenceInvoiceBody<LabTestId>>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let receipt = service.create_lab_invoice(&principal, &body.reference, body.hospital, now())?;
    Ok((StatusCode::CREATED, Json(receipt)).into_response())
}

pub(crate) async fn radiology_handler<S>(
    State(service): State<Arc<BillingService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ReferenceInvoiceBody<RadiologyOrderId>>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let receipt =
        service.create_radiology_invoice(&principal, &body.reference, body.hospital, now())?;
    Ok((StatusCode::CREATED, Json(receipt)).into_response())
}

pub(crate) async fn pharmacy_handler<S>(
    State(service): State<Arc<BillingService<S>>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ReferenceInvoiceBody<PrescriptionId>>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let receipt =
        service.create_pharmacy_invoice(&principal, &body.reference, body.hospital, now())?;
    Ok((StatusCode::CREATED, Json(receipt)).into_response())
}

pub(crate) async fn payment_handler<S>(
    State(service): State<Arc<BillingService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(invoice): Path<String>,
    Json(body): Json<PaymentBody>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let receipt = service.record_payment(
        &principal,
        &InvoiceId::new(invoice),
        body.amount,
        &body.mode_of_payment,
        now().date(),
    )?;
    Ok((StatusCode::CREATED, Json(receipt)).into_response())
}

pub(crate) async fn summary_handler<S>(
    State(service): State<Arc<BillingService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<RangeQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let summary = service.billing_summary(
        &principal,
        query.hospital,
        query.from_date,
        query.to_date,
        now().date(),
    )?;
    Ok((StatusCode::OK, Json(summary)).into_response())
}

pub(crate) async fn pending_handler<S>(
    State(service): State<Arc<BillingService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PendingQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let pending = service.pending_payments(&principal, query.hospital, query.limit)?;
    Ok((StatusCode::OK, Json(pending)).into_response())
}
