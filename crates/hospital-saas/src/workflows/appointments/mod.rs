//! Patient appointments.

pub mod domain;
pub mod router;
pub mod service;

pub use domain::{Appointment, AppointmentRequest, AppointmentStatus};
pub use router::appointment_router;
pub use service::AppointmentService;
