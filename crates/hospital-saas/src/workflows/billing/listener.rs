use std::sync::Arc;

use tracing::{debug, info};

use super::domain::ClinicalReference;
use super::service::BillingService;
use crate::config::HospitalSettings;
use crate::events::{DomainEvent, EventListener, ListenerError};
use crate::store::{require, HospitalStore};
use crate::workflows::ServiceError;

/// Raises and withdraws draft invoices as clinical events happen.
/// Invoices are posted on the day of the event that raised them.
pub struct BillingListener<S> {
    billing: Arc<BillingService<S>>,
    settings: HospitalSettings,
}

impl<S> BillingListener<S>
where
    S: HospitalStore + 'static,
{
    pub fn new(billing: Arc<BillingService<S>>, settings: HospitalSettings) -> Self {
        Self { billing, settings }
    }

    fn react(&self, event: &DomainEvent) -> Result<(), ServiceError> {
        match event {
            DomainEvent::RadiologyOrderSubmitted(order) => {
                if !self.settings.auto_create_radiology_invoice {
                    return Ok(());
                }
                let current = require(self.billing.store().radiology_orders(), &order.id)?;
                let invoice = self
                    .billing
                    .invoice_radiology_order(current, None, order.ordered_at())?;
                info!(order = %order.id, invoice = %invoice.id, "radiology order invoiced");
            }
            DomainEvent::PrescriptionDispensed(prescription) => {
                let current = require(self.billing.store().prescriptions(), &prescription.id)?;
                let posted = prescription.dispensed_at.unwrap_or(prescription.created_at);
                let invoice = self.billing.invoice_prescription(current, None, posted)?;
                info!(
                    prescription = %prescription.id,
                    invoice = %invoice.id,
                    "prescription invoiced"
                );
            }
            DomainEvent::AppointmentConfirmed(appointment) => {
                if !self.settings.auto_create_invoice {
                    return Ok(());
                }
                if let Some(invoice) = self
                    .billing
                    .invoice_appointment(appointment, appointment.created_at)?
                {
                    info!(
                        appointment = %appointment.id,
                        invoice = %invoice.id,
                        "appointment invoiced"
                    );
                }
            }
            DomainEvent::RadiologyOrderCancelled(order) => {
                let reference = ClinicalReference::RadiologyOrder(order.id.clone());
                self.billing.delete_draft_invoice(&reference)?;
            }
            DomainEvent::AppointmentCancelled(appointment) => {
                let reference = ClinicalReference::Appointment(appointment.id.clone());
                self.billing.delete_draft_invoice(&reference)?;
            }
            other => debug!(event = other.name(), "no billing for event"),
        }
        Ok(())
    }
}

impl<S> EventListener for BillingListener<S>
where
    S: HospitalStore + 'static,
{
    fn name(&self) -> &'static str {
        "billing"
    }

    fn handle(&self, event: &DomainEvent) -> Result<(), ListenerError> {
        match self.react(event) {
            Ok(()) => Ok(()),
            Err(ServiceError::AlreadyInvoiced { reference, invoice }) => {
                debug!(%reference, %invoice, "already invoiced");
                Ok(())
            }
            Err(error) => Err(ListenerError::Handler(error.to_string())),
        }
    }
}
