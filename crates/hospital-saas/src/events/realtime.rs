use std::fmt;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use super::{DomainEvent, EventListener, ListenerError};
use crate::ids::HospitalId;
use crate::workflows::ipd::AdmissionStatus;
use crate::workflows::opd::TokenStatus;

/// Subscriber group a message is published to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum Room {
    /// `hospital_{id}`: screens and staff of one tenant.
    Hospital(HospitalId),
    /// Records without a tenant go to every subscriber.
    Everyone,
}

impl Room {
    pub fn for_tenant(tenant: Option<&HospitalId>) -> Self {
        match tenant {
            Some(hospital) if !hospital.as_str().is_empty() => Self::Hospital(hospital.clone()),
            _ => Self::Everyone,
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hospital(hospital) => write!(f, "hospital_{hospital}"),
            Self::Everyone => f.write_str("all"),
        }
    }
}

impl From<Room> for String {
    fn from(value: Room) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeMessage {
    pub event: &'static str,
    pub room: Room,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    #[error("realtime transport unavailable: {0}")]
    Unavailable(String),
}

/// Realtime pub/sub transport.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, message: RealtimeMessage) -> Result<(), BroadcastError>;
}

/// In-process transport over a tokio broadcast channel.
#[derive(Clone)]
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<RealtimeMessage>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeMessage> {
        self.sender.subscribe()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&self, message: RealtimeMessage) -> Result<(), BroadcastError> {
        // No subscribers is not a failure; display screens come and go.
        let _ = self.sender.send(message);
        Ok(())
    }
}

/// Publishes status changes to the owning tenant's room.
pub struct RealtimeListener<B: ?Sized> {
    broadcaster: std::sync::Arc<B>,
}

impl<B: Broadcaster + ?Sized> RealtimeListener<B> {
    pub fn new(broadcaster: std::sync::Arc<B>) -> Self {
        Self { broadcaster }
    }
}

/// Messages a realtime subscriber should receive for `event`.
pub fn messages_for(event: &DomainEvent) -> Vec<RealtimeMessage> {
    let room = Room::for_tenant(event.tenant());
    let message = |name: &'static str, payload: Value| RealtimeMessage {
        event: name,
        room: room.clone(),
        payload,
    };

    match event {
        DomainEvent::TokenCreated(token) => vec![message(
            "queue_update",
            json!({
                "hospital": token.hospital,
                "action": "new_token",
                "current_token": token.display_number(),
                "current_patient": token.patient_name,
                "queue_position": token.queue_position,
            }),
        )],
        DomainEvent::TokenStatusChanged { token, previous } => {
            let mut messages = vec![
                message(
                    "queue_update",
                    json!({
                        "hospital": token.hospital,
                        "action": "status_change",
                        "token": token.display_number(),
                        "status": token.status.label(),
                        "patient_name": token.patient_name,
                    }),
                ),
                message(
                    "token_status_changed",
                    json!({
                        "token_name": token.id,
                        "token_number": token.token_number,
                        "old_status": previous.label(),
                        "new_status": token.status.label(),
                    }),
                ),
            ];
            if token.status == TokenStatus::WithDoctor {
                messages.push(message(
                    "patient_called",
                    json!({
                        "token": token.display_number(),
                        "patient_name": token.patient_name,
                        "practitioner": token.practitioner,
                    }),
                ));
            }
            messages
        }
        DomainEvent::TokenCalled(token) => vec![message(
            "token_called",
            json!({
                "token_number": token.token_number,
                "patient_name": token.patient_name,
            }),
        )],
        DomainEvent::LabQueueChanged { test, .. } => vec![message(
            "lab_queue_update",
            json!({
                "lab_test": test.id,
                "status": test.queue_status.label(),
                "hospital": test.hospital,
            }),
        )],
        DomainEvent::AdmissionCreated(admission) => vec![message(
            "ipd_update",
            json!({
                "hospital": admission.hospital,
                "action": "new_admission",
                "admission_id": admission.admission_id,
                "patient_name": admission.patient_name,
                "ward": admission.ward,
                "bed": admission.bed,
                "status": admission.status.label(),
                "message": format!("Patient {} admitted", admission.patient_name),
                "indicator": "orange",
            }),
        )],
        DomainEvent::AdmissionStatusChanged { admission, .. } => {
            let indicator = if admission.status == AdmissionStatus::Discharged {
                "green"
            } else {
                "blue"
            };
            vec![message(
                "ipd_update",
                json!({
                    "hospital": admission.hospital,
                    "action": "status_change",
                    "admission_id": admission.admission_id,
                    "patient_name": admission.patient_name,
                    "status": admission.status.label(),
                    "indicator": indicator,
                }),
            )]
        }
        DomainEvent::AdmissionDischarged(admission) => vec![message(
            "ipd_update",
            json!({
                "hospital": admission.hospital,
                "action": "status_change",
                "admission_id": admission.admission_id,
                "patient_name": admission.patient_name,
                "status": AdmissionStatus::Discharged.label(),
                "message": format!("Patient {} discharged", admission.patient_name),
                "indicator": "green",
            }),
        )],
        DomainEvent::RadiologyOrderSubmitted(order) => vec![message(
            "radiology_order_update",
            json!({
                "order": order.id,
                "patient": order.patient,
                "patient_name": order.patient_name,
                "examination_type": order.examination_type,
                "modality": order.modality.label(),
                "priority": order.priority.label(),
                "status": order.status.label(),
            }),
        )],
        DomainEvent::RadiologyOrderCancelled(order) => vec![message(
            "radiology_order_cancelled",
            json!({
                "order": order.id,
                "patient_name": order.patient_name,
                "examination_type": order.examination_type,
            }),
        )],
        DomainEvent::RadiologyOrderStatusChanged { order, previous } => vec![message(
            "radiology_queue_update",
            json!({
                "order": order.id,
                "patient_name": order.patient_name,
                "examination_type": order.examination_type,
                "old_status": previous.label(),
                "new_status": order.status.label(),
                "priority": order.priority.label(),
            }),
        )],
        DomainEvent::RadiologyExamStarted(order) => vec![message(
            "radiology_exam_started",
            json!({
                "order": order.id,
                "patient_name": order.patient_name,
                "examination_type": order.examination_type,
            }),
        )],
        DomainEvent::RadiologyResultSubmitted(result) => vec![message(
            "radiology_result_ready",
            json!({
                "result": result.id,
                "patient": result.patient,
                "patient_name": result.patient_name,
                "examination_type": result.examination_type,
                "status": result.status.label(),
            }),
        )],
        DomainEvent::PrescriptionDispensed(prescription) => vec![message(
            "pharmacy_queue_update",
            json!({
                "prescription": prescription.id,
                "patient_name": prescription.patient_name,
                "status": prescription.status.label(),
            }),
        )],
        DomainEvent::AppointmentConfirmed(_)
        | DomainEvent::AppointmentCancelled(_)
        | DomainEvent::PatientRegistered(_) => Vec::new(),
    }
}

impl<B: Broadcaster + ?Sized> EventListener for RealtimeListener<B> {
    fn name(&self) -> &'static str {
        "realtime"
    }

    fn handle(&self, event: &DomainEvent) -> Result<(), ListenerError> {
        for message in messages_for(event) {
            self.broadcaster.publish(message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::opd::QueueToken;
    use std::sync::Arc;

    #[test]
    fn rooms_follow_the_tenant() {
        assert_eq!(
            Room::for_tenant(Some(&HospitalId::from("H1"))).to_string(),
            "hospital_H1"
        );
        assert_eq!(Room::for_tenant(Some(&HospitalId::from(""))), Room::Everyone);
        assert_eq!(Room::for_tenant(None), Room::Everyone);
    }

    #[test]
    fn with_doctor_transition_also_announces_the_patient() {
        let mut token = QueueToken::fixture("TKN-00001", Some("H1"), 1);
        token.status = TokenStatus::WithDoctor;
        let event = DomainEvent::TokenStatusChanged {
            token,
            previous: TokenStatus::Called,
        };

        let names: Vec<&str> = messages_for(&event).iter().map(|m| m.event).collect();
        assert_eq!(
            names,
            vec!["queue_update", "token_status_changed", "patient_called"]
        );
    }

    #[tokio::test]
    async fn channel_broadcaster_delivers_to_subscribers() {
        let broadcaster = Arc::new(ChannelBroadcaster::new(8));
        let mut receiver = broadcaster.subscribe();
        let listener = RealtimeListener::new(broadcaster.clone());

        let token = QueueToken::fixture("TKN-00001", Some("H1"), 1);
        listener
            .handle(&DomainEvent::TokenCreated(token))
            .expect("publish succeeds");

        let message = receiver.recv().await.expect("message");
        assert_eq!(message.event, "queue_update");
        assert_eq!(message.room.to_string(), "hospital_H1");
        assert_eq!(message.payload["current_token"], "OPD001");
        assert_eq!(message.payload["action"], "new_token");
    }

    #[test]
    fn publishing_without_subscribers_is_ok() {
        let broadcaster = ChannelBroadcaster::default();
        let message = RealtimeMessage {
            event: "queue_update",
            room: Room::Everyone,
            payload: Value::Null,
        };
        assert!(broadcaster.publish(message).is_ok());
    }
}
