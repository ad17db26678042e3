use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::info;

use super::domain::{Appointment, AppointmentRequest, AppointmentStatus};
use crate::events::{DomainEvent, EventDispatcher};
use crate::ids::{AppointmentId, PrincipalId};
use crate::store::{require, HospitalStore, Record};
use crate::tenancy::{resolve_tenant, Principal};
use crate::workflows::{
    ensure_visible, load_principal, next_document_name, write_tenant, DocStatus, ServiceError,
};

/// Booked consultations. Submitting confirms, cancelling releases the slot.
pub struct AppointmentService<S> {
    store: Arc<S>,
    events: Arc<EventDispatcher>,
}

impl<S> AppointmentService<S>
where
    S: HospitalStore + 'static,
{
    pub fn new(store: Arc<S>, events: Arc<EventDispatcher>) -> Self {
        Self { store, events }
    }

    pub fn principal(&self, user: &PrincipalId) -> Result<Principal, ServiceError> {
        load_principal(&*self.store, user)
    }

    pub fn book(
        &self,
        principal: &Principal,
        request: AppointmentRequest,
        now: NaiveDateTime,
    ) -> Result<Appointment, ServiceError> {
        let patient = require(self.store.patients(), &request.patient)?;
        ensure_visible(&*self.store, principal, &patient)?;
        let hospital = match request.hospital {
            Some(hospital) => write_tenant(&*self.store, principal, Some(hospital))?,
            None => None,
        };
        let practitioner_name = match request.practitioner.as_ref() {
            Some(id) => Some(require(self.store.practitioners(), id)?.practitioner_name),
            None => None,
        };

        let appointments = self.store.appointments();
        let id = AppointmentId::new(next_document_name(&*self.store, appointments, "APT")?);
        let appointment = appointments.insert(Appointment {
            id,
            patient: patient.id,
            patient_name: patient.patient_name,
            practitioner: request.practitioner,
            practitioner_name,
            department: request.department,
            appointment_date: request.appointment_date,
            appointment_time: request.appointment_time,
            status: AppointmentStatus::Open,
            docstatus: DocStatus::Draft,
            hospital,
            created_at: now,
        })?;
        info!(
            appointment = %appointment.id,
            date = %appointment.appointment_date,
            "appointment booked"
        );
        Ok(appointment)
    }

    /// Confirm a draft booking. The tenant comes from the practitioner, then
    /// from the confirming user.
    pub fn submit(
        &self,
        principal: &Principal,
        id: &AppointmentId,
    ) -> Result<Appointment, ServiceError> {
        let mut appointment = require(self.store.appointments(), id)?;
        ensure_visible(&*self.store, principal, &appointment)?;
        if appointment.docstatus != DocStatus::Draft {
            return Err(ServiceError::IllegalTransition {
                kind: Appointment::KIND,
                from: appointment.docstatus.label(),
                to: DocStatus::Submitted.label(),
            });
        }

        if appointment.hospital.is_none() {
            let from_practitioner = match appointment.practitioner.as_ref() {
                Some(practitioner) => self
                    .store
                    .practitioners()
                    .fetch(practitioner)?
                    .and_then(|practitioner| practitioner.hospital),
                None => None,
            };
            appointment.hospital = match from_practitioner {
                Some(hospital) => Some(hospital),
                None => resolve_tenant(&*self.store, principal)?,
            };
        }

        appointment.status = AppointmentStatus::Scheduled;
        appointment.docstatus = DocStatus::Submitted;
        self.store.appointments().update(appointment.clone())?;
        info!(
            appointment = %appointment.id,
            patient = %appointment.patient_name,
            date = %appointment.appointment_date,
            "appointment confirmed"
        );
        self.events
            .dispatch(&[DomainEvent::AppointmentConfirmed(appointment.clone())]);
        Ok(appointment)
    }

    pub fn cancel(
        &self,
        principal: &Principal,
        id: &AppointmentId,
    ) -> Result<Appointment, ServiceError> {
        let mut appointment = require(self.store.appointments(), id)?;
        ensure_visible(&*self.store, principal, &appointment)?;
        if appointment.docstatus != DocStatus::Submitted {
            return Err(ServiceError::IllegalTransition {
                kind: Appointment::KIND,
                from: appointment.docstatus.label(),
                to: DocStatus::Cancelled.label(),
            });
        }

        appointment.status = AppointmentStatus::Cancelled;
        appointment.docstatus = DocStatus::Cancelled;
        self.store.appointments().update(appointment.clone())?;
        info!(appointment = %appointment.id, "appointment cancelled");
        self.events
            .dispatch(&[DomainEvent::AppointmentCancelled(appointment.clone())]);
        Ok(appointment)
    }

    /// Confirmed appointments on `date`, for reminders.
    pub fn confirmed_on(&self, date: NaiveDate) -> Result<Vec<Appointment>, ServiceError> {
        Ok(self.store.appointments().select(&|appointment: &Appointment| {
            appointment.appointment_date == date
                && appointment.docstatus == DocStatus::Submitted
                && appointment.status != AppointmentStatus::Cancelled
        })?)
    }
}
