//! Outpatient department queue.

pub mod domain;
pub mod router;
pub mod service;

pub use domain::{
    CallNextOutcome, QueueDisplay, QueueToken, StatusUpdate, TokenDisplay, TokenReceipt,
    TokenRequest, TokenStatus,
};
pub use router::opd_router;
pub use service::{NextTokenNumber, OpdService};
