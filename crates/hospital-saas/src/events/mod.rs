//! Post-commit side effects.
//!
//! Services persist first, then hand the list of [`DomainEvent`]s they
//! produced to an [`EventDispatcher`]. Every listener sees every event and may
//! fail on its own; failures are logged and collected in a [`DispatchReport`]
//! but never undo the write that raised them.

mod notify;
mod realtime;

pub use notify::{
    Channel, MemoryNotifier, NotificationListener, Notifier, NotifyError, OutboundMessage,
};
pub use realtime::{
    messages_for, BroadcastError, Broadcaster, ChannelBroadcaster, RealtimeListener,
    RealtimeMessage, Room,
};

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::ids::HospitalId;
use crate::workflows::appointments::Appointment;
use crate::workflows::ipd::{Admission, AdmissionStatus};
use crate::workflows::lab::{LabQueueStatus, LabTest};
use crate::workflows::opd::{QueueToken, TokenStatus};
use crate::workflows::pharmacy::Prescription;
use crate::workflows::radiology::{OrderStatus, RadiologyOrder, RadiologyResult};
use crate::workflows::registry::Patient;

/// Something that happened to a stored record.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    TokenCreated(QueueToken),
    TokenStatusChanged {
        token: QueueToken,
        previous: TokenStatus,
    },
    TokenCalled(QueueToken),
    LabQueueChanged {
        test: LabTest,
        previous: LabQueueStatus,
    },
    AdmissionCreated(Admission),
    AdmissionStatusChanged {
        admission: Admission,
        previous: AdmissionStatus,
    },
    AdmissionDischarged(Admission),
    RadiologyOrderSubmitted(RadiologyOrder),
    RadiologyOrderCancelled(RadiologyOrder),
    RadiologyOrderStatusChanged {
        order: RadiologyOrder,
        previous: OrderStatus,
    },
    RadiologyExamStarted(RadiologyOrder),
    RadiologyResultSubmitted(RadiologyResult),
    PrescriptionDispensed(Prescription),
    AppointmentConfirmed(Appointment),
    AppointmentCancelled(Appointment),
    PatientRegistered(Patient),
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TokenCreated(_) => "token_created",
            Self::TokenStatusChanged { .. } => "token_status_changed",
            Self::TokenCalled(_) => "token_called",
            Self::LabQueueChanged { .. } => "lab_queue_changed",
            Self::AdmissionCreated(_) => "admission_created",
            Self::AdmissionStatusChanged { .. } => "admission_status_changed",
            Self::AdmissionDischarged(_) => "admission_discharged",
            Self::RadiologyOrderSubmitted(_) => "radiology_order_submitted",
            Self::RadiologyOrderCancelled(_) => "radiology_order_cancelled",
            Self::RadiologyOrderStatusChanged { .. } => "radiology_order_status_changed",
            Self::RadiologyExamStarted(_) => "radiology_exam_started",
            Self::RadiologyResultSubmitted(_) => "radiology_result_submitted",
            Self::PrescriptionDispensed(_) => "prescription_dispensed",
            Self::AppointmentConfirmed(_) => "appointment_confirmed",
            Self::AppointmentCancelled(_) => "appointment_cancelled",
            Self::PatientRegistered(_) => "patient_registered",
        }
    }

    /// Tenant owning the record behind the event.
    pub fn tenant(&self) -> Option<&HospitalId> {
        match self {
            Self::TokenCreated(token)
            | Self::TokenCalled(token)
            | Self::TokenStatusChanged { token, .. } => token.hospital.as_ref(),
            Self::LabQueueChanged { test, .. } => test.hospital.as_ref(),
            Self::AdmissionCreated(admission)
            | Self::AdmissionDischarged(admission)
            | Self::AdmissionStatusChanged { admission, .. } => admission.hospital.as_ref(),
            Self::RadiologyOrderSubmitted(order)
            | Self::RadiologyOrderCancelled(order)
            | Self::RadiologyExamStarted(order)
            | Self::RadiologyOrderStatusChanged { order, .. } => order.hospital.as_ref(),
            Self::RadiologyResultSubmitted(result) => result.hospital.as_ref(),
            Self::PrescriptionDispensed(prescription) => prescription.hospital.as_ref(),
            Self::AppointmentConfirmed(appointment) | Self::AppointmentCancelled(appointment) => {
                appointment.hospital.as_ref()
            }
            Self::PatientRegistered(patient) => patient.hospital.as_ref(),
        }
    }
}

/// Error a single listener reports back to the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
    #[error("{0}")]
    Handler(String),
}

/// Independent reaction to domain events.
pub trait EventListener: Send + Sync {
    fn name(&self) -> &'static str;
    fn handle(&self, event: &DomainEvent) -> Result<(), ListenerError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerFailure {
    pub listener: &'static str,
    pub event: &'static str,
    pub error: String,
}

/// Outcome of one dispatch round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failures: Vec<ListenerFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fans events out to every registered listener.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn register(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub fn listener_names(&self) -> Vec<&'static str> {
        self.listeners.iter().map(|listener| listener.name()).collect()
    }

    pub fn dispatch(&self, events: &[DomainEvent]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for event in events {
            for listener in &self.listeners {
                match listener.handle(event) {
                    Ok(()) => report.delivered += 1,
                    Err(error) => {
                        warn!(
                            listener = listener.name(),
                            event = event.name(),
                            %error,
                            "event listener failed"
                        );
                        report.failures.push(ListenerFailure {
                            listener: listener.name(),
                            event: event.name(),
                            error: error.to_string(),
                        });
                    }
                }
            }
        }
        debug!(
            events = events.len(),
            delivered = report.delivered,
            failed = report.failures.len(),
            "dispatched domain events"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::registry::Patient;
    use std::sync::Mutex;

    struct Failing;

    impl EventListener for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn handle(&self, _event: &DomainEvent) -> Result<(), ListenerError> {
            Err(ListenerError::Handler("gateway offline".to_string()))
        }
    }

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<&'static str>>,
    }

    impl EventListener for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn handle(&self, event: &DomainEvent) -> Result<(), ListenerError> {
            self.seen
                .lock()
                .map_err(|_| ListenerError::Handler("poisoned".to_string()))?
                .push(event.name());
            Ok(())
        }
    }

    #[test]
    fn failing_listener_does_not_stop_the_others() {
        let recording = Arc::new(Recording::default());
        let dispatcher = EventDispatcher::new()
            .with_listener(Arc::new(Failing))
            .with_listener(recording.clone());

        let event = DomainEvent::PatientRegistered(Patient::fixture("PAT-00001", Some("H1")));
        let report = dispatcher.dispatch(&[event.clone(), event]);

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].listener, "failing");
        assert_eq!(report.failures[0].event, "patient_registered");
        assert_eq!(report.failures[0].error, "gateway offline");
        assert_eq!(
            *recording.seen.lock().expect("lock"),
            vec!["patient_registered", "patient_registered"]
        );
    }

    #[test]
    fn empty_dispatch_is_clean() {
        let dispatcher = EventDispatcher::new().with_listener(Arc::new(Failing));
        assert!(dispatcher.dispatch(&[]).is_clean());
        assert_eq!(dispatcher.listener_names(), vec!["failing"]);
    }
}
