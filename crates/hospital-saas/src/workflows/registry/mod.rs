//! Tenant onboarding, patient registration and departments.

pub mod domain;
pub mod router;
pub mod service;

pub use domain::{
    normalise_mobile, Department, DepartmentDraft, DepartmentStats, DepartmentStatus,
    HospitalStats, HospitalSummary, Patient, PatientDraft, WizardOutcome,
};
pub use router::{registry_router, WizardRequest};
pub use service::RegistryService;
