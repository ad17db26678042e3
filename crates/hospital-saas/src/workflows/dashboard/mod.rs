//! Dashboards for hospital staff and platform managers.

pub mod domain;
pub mod router;
pub mod service;

pub use domain::{
    Activity, ActivityKind, AlertLevel, DashboardStats, HospitalDashboard, RevenueChart,
    RevenuePeriod, SubscriptionAlert, SuperAdminDashboard,
};
pub use router::dashboard_router;
pub use service::DashboardService;
