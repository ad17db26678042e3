//! Pharmacy counters and prescriptions.

pub mod domain;
pub mod router;
pub mod service;

pub use domain::{
    DispenseOutcome, Medication, MedicationDraft, Pharmacy, PharmacyDraft, PharmacyQueueEntry,
    Prescription, PrescriptionItem, PrescriptionLine, PrescriptionRequest, PrescriptionStatus,
};
pub use router::pharmacy_router;
pub use service::PharmacyService;
