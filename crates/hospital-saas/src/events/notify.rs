use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;

use super::{DomainEvent, EventListener, ListenerError};
use crate::config::HospitalSettings;
use crate::ids::HospitalId;
use crate::store::{HospitalStore, RepositoryError};
use crate::tenancy::{Principal, Role};
use crate::workflows::appointments::Appointment;
use crate::workflows::ipd::Admission;
use crate::workflows::opd::QueueToken;
use crate::workflows::radiology::{RadiologyOrder, RadiologyResult};
use crate::workflows::registry::Patient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Sms,
    Email,
    /// Desk notification for a signed-in user.
    InApp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("{channel:?} delivery to {recipient} failed: {reason}")]
    Delivery {
        channel: Channel,
        recipient: String,
        reason: String,
    },
    #[error("notification lookup failed: {0}")]
    Lookup(#[from] RepositoryError),
}

/// SMS, e-mail and desk-notification gateway.
pub trait Notifier: Send + Sync {
    fn send(&self, message: OutboundMessage) -> Result<(), NotifyError>;
}

/// Keeps every message in memory. Used by tests and the demo.
#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl MemoryNotifier {
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl Notifier for MemoryNotifier {
    fn send(&self, message: OutboundMessage) -> Result<(), NotifyError> {
        let mut sent = self.sent.lock().map_err(|_| NotifyError::Delivery {
            channel: message.channel,
            recipient: message.recipient.clone(),
            reason: "outbox lock poisoned".to_string(),
        })?;
        sent.push(message);
        Ok(())
    }
}

/// Text messages, e-mails and desk notifications to patients and staff.
pub struct NotificationListener<S> {
    store: Arc<S>,
    settings: HospitalSettings,
    notifier: Arc<dyn Notifier>,
}

impl<S> NotificationListener<S>
where
    S: HospitalStore + 'static,
{
    pub fn new(store: Arc<S>, settings: HospitalSettings, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            settings,
            notifier,
        }
    }

    fn hospital_name(&self, tenant: Option<&HospitalId>) -> Result<String, NotifyError> {
        let name = match tenant {
            Some(id) => self
                .store
                .hospitals()
                .fetch(id)?
                .map(|hospital| hospital.business_name),
            None => None,
        };
        Ok(name.unwrap_or_else(|| "Hospital".to_string()))
    }

    fn sms(&self, mobile: Option<&str>, body: String) -> Result<(), NotifyError> {
        let Some(mobile) = mobile.filter(|mobile| !mobile.is_empty()) else {
            return Ok(());
        };
        if !self.settings.enable_sms_notifications {
            return Ok(());
        }
        self.notifier.send(OutboundMessage {
            channel: Channel::Sms,
            recipient: mobile.to_string(),
            subject: None,
            body,
        })
    }

    fn email(&self, email: Option<&str>, subject: String, body: String) -> Result<(), NotifyError> {
        let Some(email) = email.filter(|email| !email.is_empty()) else {
            return Ok(());
        };
        if !self.settings.enable_email_notifications {
            return Ok(());
        }
        self.notifier.send(OutboundMessage {
            channel: Channel::Email,
            recipient: email.to_string(),
            subject: Some(subject),
            body,
        })
    }

    fn desk(&self, user: &str, subject: String, body: String) -> Result<(), NotifyError> {
        self.notifier.send(OutboundMessage {
            channel: Channel::InApp,
            recipient: user.to_string(),
            subject: Some(subject),
            body,
        })
    }

    fn token_created(&self, token: &QueueToken) -> Result<(), NotifyError> {
        let hospital = self.hospital_name(token.hospital.as_ref())?;
        let doctor = token.practitioner_name.as_deref().unwrap_or("General OPD");
        let body = format!(
            "{hospital}\nToken: {}\nDate: {}\nDoctor: {doctor}\n\nPlease arrive 15 mins before your turn.",
            token.display_number(),
            token.token_date,
        );
        self.sms(token.mobile.as_deref(), body)
    }

    fn token_called(&self, token: &QueueToken) -> Result<(), NotifyError> {
        let hospital = self.hospital_name(token.hospital.as_ref())?;
        let room = token
            .practitioner_name
            .as_deref()
            .map(|doctor| format!("Dr. {doctor}"))
            .unwrap_or_else(|| "the consultation room".to_string());
        let body = format!(
            "{hospital}\nToken {} is being called. Please proceed to {room}.",
            token.display_number(),
        );
        self.sms(token.mobile.as_deref(), body)
    }

    fn admission_created(&self, admission: &Admission) -> Result<(), NotifyError> {
        let hospital = self.hospital_name(admission.hospital.as_ref())?;
        let body = format!(
            "{hospital}\nPatient Admitted\nID: {}\nName: {}\nWard: {}\nRoom: {} Bed: {}\nDoctor: {}\nDate: {}",
            admission.admission_id,
            admission.patient_name,
            admission.ward.as_deref().unwrap_or("General"),
            admission.room.as_deref().unwrap_or("-"),
            admission.bed.as_deref().unwrap_or("-"),
            admission
                .practitioner
                .as_ref()
                .map(|practitioner| practitioner.as_str())
                .unwrap_or("-"),
            admission.admission_date,
        );
        self.sms(admission.mobile.as_deref(), body)
    }

    fn admission_discharged(&self, admission: &Admission) -> Result<(), NotifyError> {
        let discharged = admission
            .actual_discharge
            .map(|at| at.format("%d-%m-%Y %H:%M").to_string())
            .unwrap_or_default();
        let body = format!(
            "Patient Discharged\nID: {}\nName: {}\nDate: {discharged}\nBalance: Rs.{:.2}\n\nThank you for choosing our hospital.",
            admission.admission_id, admission.patient_name, admission.balance_due,
        );
        self.sms(admission.mobile.as_deref(), body)
    }

    fn radiology_order_submitted(&self, order: &RadiologyOrder) -> Result<(), NotifyError> {
        let department = [Role::RadiologyTechnician, Role::Radiologist];
        let tenant = order.hospital.clone();
        let staff = self.store.principals().select(&|principal: &Principal| {
            principal.has_any_role(&department)
                && (tenant.is_none() || principal.hospital.is_none() || principal.hospital == tenant)
        })?;
        for user in staff {
            self.desk(
                user.id.as_str(),
                "New Radiology Order".to_string(),
                format!(
                    "New {} order: {} for {}",
                    order.priority.label(),
                    order.examination_type,
                    order.patient_name
                ),
            )?;
        }
        Ok(())
    }

    fn radiology_result_submitted(&self, result: &RadiologyResult) -> Result<(), NotifyError> {
        let Some(practitioner) = result.practitioner.as_ref() else {
            return Ok(());
        };
        let user = self
            .store
            .practitioners()
            .fetch(practitioner)?
            .and_then(|practitioner| practitioner.user);
        let Some(user) = user else {
            return Ok(());
        };
        self.desk(
            user.as_str(),
            "Radiology Result Ready".to_string(),
            format!(
                "Radiology result for {} ({}) is ready for review",
                result.patient_name, result.examination_type
            ),
        )
    }

    fn patient_email(&self, appointment: &Appointment) -> Result<Option<String>, NotifyError> {
        Ok(self
            .store
            .patients()
            .fetch(&appointment.patient)?
            .and_then(|patient| patient.email))
    }

    fn appointment_confirmed(&self, appointment: &Appointment) -> Result<(), NotifyError> {
        let email = self.patient_email(appointment)?;
        let doctor = match appointment.practitioner.as_ref() {
            Some(id) => self
                .store
                .practitioners()
                .fetch(id)?
                .map(|practitioner| practitioner.practitioner_name)
                .unwrap_or_else(|| id.to_string()),
            None => "Doctor".to_string(),
        };
        let department = appointment
            .department
            .as_ref()
            .map(|department| department.to_string())
            .unwrap_or_else(|| "General".to_string());
        let body = format!(
            "Dear {},\n\nYour appointment has been confirmed with the following details:\n\n\
             Date: {}\nTime: {}\nDoctor: {doctor}\nDepartment: {department}\n\n\
             Appointment ID: {}\n\nPlease arrive 15 minutes before your scheduled time.\n\n\
             Thank you for choosing our hospital.\n\nBest regards,\nHospital Team",
            appointment.patient_name,
            appointment.appointment_date,
            appointment.appointment_time.format("%H:%M"),
            appointment.id,
        );
        self.email(
            email.as_deref(),
            format!("Appointment Confirmed - {}", appointment.appointment_date),
            body,
        )
    }

    fn appointment_cancelled(&self, appointment: &Appointment) -> Result<(), NotifyError> {
        let email = self.patient_email(appointment)?;
        let body = format!(
            "Dear {},\n\nYour appointment scheduled for {} at {} has been cancelled.\n\n\
             If you did not request this cancellation, please contact us immediately.\n\n\
             To reschedule, please visit our booking portal or contact our reception.\n\n\
             Best regards,\nHospital Team",
            appointment.patient_name,
            appointment.appointment_date,
            appointment.appointment_time.format("%H:%M"),
        );
        self.email(
            email.as_deref(),
            format!("Appointment Cancelled - {}", appointment.appointment_date),
            body,
        )
    }

    fn patient_registered(&self, patient: &Patient) -> Result<(), NotifyError> {
        let hospital = self.hospital_name(patient.hospital.as_ref())?;
        self.email(
            patient.email.as_deref(),
            format!("Welcome to {hospital}"),
            format!(
                "Dear {},\n\nYour patient ID is {}.\n\nBest regards,\nHospital Team",
                patient.patient_name, patient.id
            ),
        )
    }
}

impl<S> EventListener for NotificationListener<S>
where
    S: HospitalStore + 'static,
{
    fn name(&self) -> &'static str {
        "notifications"
    }

    fn handle(&self, event: &DomainEvent) -> Result<(), ListenerError> {
        match event {
            DomainEvent::TokenCreated(token) => self.token_created(token)?,
            DomainEvent::TokenCalled(token) => self.token_called(token)?,
            DomainEvent::AdmissionCreated(admission) => self.admission_created(admission)?,
            DomainEvent::AdmissionDischarged(admission) => self.admission_discharged(admission)?,
            DomainEvent::RadiologyOrderSubmitted(order) => self.radiology_order_submitted(order)?,
            DomainEvent::RadiologyResultSubmitted(result) => {
                self.radiology_result_submitted(result)?
            }
            DomainEvent::AppointmentConfirmed(appointment) => {
                self.appointment_confirmed(appointment)?
            }
            DomainEvent::AppointmentCancelled(appointment) => {
                self.appointment_cancelled(appointment)?
            }
            DomainEvent::PatientRegistered(patient) => self.patient_registered(patient)?,
            other => debug!(event = other.name(), "no notification for event"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::tenancy::Hospital;

    fn listener(settings: HospitalSettings) -> (NotificationListener<MemoryStore>, Arc<MemoryNotifier>) {
        let store = Arc::new(MemoryStore::default());
        store
            .hospitals()
            .insert(Hospital::named(HospitalId::from("H1"), "City Care"))
            .expect("hospital");
        let notifier = Arc::new(MemoryNotifier::default());
        (
            NotificationListener::new(store, settings, notifier.clone()),
            notifier,
        )
    }

    #[test]
    fn token_sms_carries_hospital_and_display_number() {
        let (listener, notifier) = listener(HospitalSettings::default());
        let mut token = QueueToken::fixture("TKN-00001", Some("H1"), 3);
        token.mobile = Some("+919800000001".to_string());

        listener
            .handle(&DomainEvent::TokenCreated(token))
            .expect("sms sent");

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, Channel::Sms);
        assert_eq!(sent[0].recipient, "+919800000001");
        assert!(sent[0].body.starts_with("City Care\nToken: OPD003"));
        assert!(sent[0].body.contains("Doctor: General OPD"));
    }

    #[test]
    fn sms_respects_settings_and_missing_mobile() {
        let settings = HospitalSettings {
            enable_sms_notifications: false,
            ..HospitalSettings::default()
        };
        let (listener, notifier) = listener(settings);
        let mut token = QueueToken::fixture("TKN-00001", Some("H1"), 1);
        token.mobile = Some("9800000001".to_string());
        listener
            .handle(&DomainEvent::TokenCalled(token.clone()))
            .expect("skipped");

        let (listener, second) = listener_default();
        token.mobile = None;
        listener
            .handle(&DomainEvent::TokenCalled(token))
            .expect("skipped");

        assert!(notifier.sent().is_empty());
        assert!(second.sent().is_empty());
    }

    fn listener_default() -> (NotificationListener<MemoryStore>, Arc<MemoryNotifier>) {
        listener(HospitalSettings::default())
    }

    #[test]
    fn welcome_email_uses_hospital_name() {
        let (listener, notifier) = listener_default();
        let mut patient = Patient::fixture("PAT-00001", Some("H1"));
        patient.email = Some("asha@example.test".to_string());

        listener
            .handle(&DomainEvent::PatientRegistered(patient))
            .expect("email sent");

        let sent = notifier.sent();
        assert_eq!(sent[0].channel, Channel::Email);
        assert_eq!(sent[0].subject.as_deref(), Some("Welcome to City Care"));
    }
}
