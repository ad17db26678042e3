use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::domain::RevenuePeriod;
use super::service::DashboardService;
use crate::http::{now, CurrentUser};
use crate::ids::HospitalId;
use crate::store::HospitalStore;
use crate::workflows::ServiceError;

#[derive(Debug, Default, Deserialize)]
pub struct ChartQuery {
    #[serde(default)]
    pub hospital: Option<HospitalId>,
    #[serde(default)]
    pub period: RevenuePeriod,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    #[serde(default)]
    pub hospital: Option<HospitalId>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub fn dashboard_router<S>(service: Arc<DashboardService<S>>) -> Router
where
    S: HospitalStore + 'static,
{
    Router::new()
        .route("/api/v1/dashboard/stats", get(stats_handler::<S>))
        .route(
            "/api/v1/dashboard/hospitals/:hospital",
            get(hospital_handler::<S>),
        )
        .route("/api/v1/dashboard/super-admin", get(super_admin_handler::<S>))
        .route("/api/v1/dashboard/revenue-chart", get(revenue_chart_handler::<S>))
        .route("/api/v1/dashboard/activity", get(activity_handler::<S>))
        .with_state(service)
}

pub(crate) async fn stats_handler<S>(
    State(service): State<Arc<DashboardService<S>>>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let stats = service.dashboard_stats(&principal, now().date())?;
    Ok((StatusCode::OK, Json(stats)).into_response())
}

pub(crate) async fn hospital_handler<S>(
    State(service): State<Arc<DashboardService<S>>>,
    CurrentUser(user): CurrentUser,
    Path(hospital): Path<String>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let view = service.hospital_dashboard(&principal, &HospitalId::new(hospital), now().date())?;
    Ok((StatusCode::OK, Json(view)).into_response())
}

pub(crate) async fn super_admin_handler<S>(
    State(service): State<Arc<DashboardService<S>>>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let view = service.super_admin_dashboard(&principal, now().date())?;
    Ok((StatusCode::OK, Json(view)).into_response())
}

pub(crate) async fn revenue_chart_handler<S>(
    State(service): State<Arc<DashboardService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ChartQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let chart = service.revenue_chart(&principal, query.hospital, query.period, now().date())?;
    Ok((StatusCode::OK, Json(chart)).into_response())
}

pub(crate) async fn activity_handler<S>(
    State(service): State<Arc<DashboardService<S>>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ActivityQuery>,
) -> Result<Response, ServiceError>
where
    S: HospitalStore + 'static,
{
    let principal = service.principal(&user)?;
    let feed = service.recent_activity(&principal, query.hospital, query.limit)?;
    Ok((StatusCode::OK, Json(feed)).into_response())
}
