//! Inpatient admissions.

pub mod domain;
pub mod router;
pub mod service;

pub use domain::{
    Admission, AdmissionRequest, AdmissionStatus, AdvanceReceipt, BillingUpdate,
    DischargeOutcome, DischargeRequest, IpdDashboard,
};
pub use router::ipd_router;
pub use service::IpdService;
