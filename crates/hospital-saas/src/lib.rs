//! Multi-tenant hospital management: daily OPD queues, lab and radiology
//! boards, inpatient admissions, pharmacy dispensing and the billing records
//! derived from them.
//!
//! Storage, realtime transport and SMS/e-mail delivery sit behind traits
//! (`store::HospitalStore`, `events::Broadcaster`, `events::Notifier`) so the
//! workflows can run against the in-memory implementations shipped here.

pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod ids;
pub mod sequence;
pub mod store;
pub mod tasks;
pub mod telemetry;
pub mod tenancy;
pub mod workflows;
