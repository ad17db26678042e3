use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use super::domain::{
    BillingSummary, ClinicalReference, ConsultationInvoiceRequest, Customer, Invoice, InvoiceItem,
    InvoiceReceipt, Payment, PaymentReceipt, PendingPayment, ServiceRevenue, ServiceType,
};
use crate::ids::{
    CustomerId, HospitalId, InvoiceId, LabTestId, PatientId, PaymentId, PrescriptionId,
    PrincipalId, RadiologyOrderId,
};
use crate::store::{require, HospitalStore};
use crate::tenancy::{Principal, TenantFilter};
use crate::workflows::appointments::Appointment;
use crate::workflows::lab::{LabTest, PaymentStatus};
use crate::workflows::pharmacy::Prescription;
use crate::workflows::radiology::RadiologyOrder;
use crate::workflows::{
    ensure_visible, load_principal, next_document_name, read_scope, round_to, write_tenant,
    DocStatus, ServiceError,
};

/// Default page size for the pending-payments list.
pub const PENDING_PAYMENTS_LIMIT: usize = 50;

/// Invoice derivation from clinical events, and the payments against them.
pub struct BillingService<S> {
    store: Arc<S>,
}

impl<S> BillingService<S>
where
    S: HospitalStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn principal(&self, user: &PrincipalId) -> Result<Principal, ServiceError> {
        load_principal(&*self.store, user)
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    /// Bill an outpatient consultation at the given amount or the
    /// practitioner's consulting charge.
    pub fn create_consultation_invoice(
        &self,
        principal: &Principal,
        request: ConsultationInvoiceRequest,
        now: NaiveDateTime,
    ) -> Result<InvoiceReceipt, ServiceError> {
        let patient = require(self.store.patients(), &request.patient)?;
        ensure_visible(&*self.store, principal, &patient)?;
        let practitioner = require(self.store.practitioners(), &request.practitioner)?;
        let hospital = write_tenant(&*self.store, principal, request.hospital)?
            .or_else(|| practitioner.hospital.clone())
            .ok_or_else(|| ServiceError::validation("Hospital not specified"))?;
        let amount = request.amount.unwrap_or(practitioner.consulting_charge);
        if amount.is_nan() || amount < 0.0 {
            return Err(ServiceError::validation("Amount cannot be negative"));
        }

        let reference = request.encounter.map(ClinicalReference::Encounter);
        let item = InvoiceItem::new(
            format!("OPD Consultation - {}", practitioner.practitioner_name),
            format!("Consultation with {}", practitioner.id),
            1.0,
            amount,
        );
        let invoice = self.raise(
            &patient.id,
            Some(hospital),
            ServiceType::OpdConsultation,
            reference,
            vec![item],
            now,
        )?;
        Ok(InvoiceReceipt::from(&invoice))
    }

    pub fn create_lab_invoice(
        &self,
        principal: &Principal,
        test: &LabTestId,
        hospital: Option<HospitalId>,
        now: NaiveDateTime,
    ) -> Result<InvoiceReceipt, ServiceError> {
        let test = require(self.store.lab_tests(), test)?;
        ensure_visible(&*self.store, principal, &test)?;
        let invoice = self.invoice_lab_test(test, hospital, now)?;
        Ok(InvoiceReceipt::from(&invoice))
    }

    /// Bill a lab test at its template fee and mark it awaiting payment.
    pub fn invoice_lab_test(
        &self,
        mut test: LabTest,
        hospital: Option<HospitalId>,
        now: NaiveDateTime,
    ) -> Result<Invoice, ServiceError> {
        let hospital = hospital
            .or_else(|| test.hospital.clone())
            .ok_or_else(|| ServiceError::validation("Hospital not specified"))?;
        let reference = ClinicalReference::LabTest(test.id.clone());
        self.ensure_not_invoiced(&reference)?;

        let fee = match test.template.as_ref() {
            Some(template) => self
                .store
                .lab_templates()
                .fetch(template)?
                .map_or(0.0, |template| template.test_fee),
            None => 0.0,
        };
        let test_name = test
            .template
            .as_ref()
            .map_or_else(|| "Lab Test".to_string(), ToString::to_string);
        let item = InvoiceItem::new(
            format!("Lab Test - {test_name}"),
            format!("Laboratory Test: {test_name}"),
            1.0,
            fee,
        );
        let invoice = self.raise(
            &test.patient,
            Some(hospital),
            ServiceType::LabTest,
            Some(reference),
            vec![item],
            now,
        )?;

        test.payment_status = Some(PaymentStatus::Pending);
        test.modified_at = now;
        self.store.lab_tests().update(test)?;
        Ok(invoice)
    }

    pub fn create_radiology_invoice(
        &self,
        principal: &Principal,
        order: &RadiologyOrderId,
        hospital: Option<HospitalId>,
        now: NaiveDateTime,
    ) -> Result<InvoiceReceipt, ServiceError> {
        let order = require(self.store.radiology_orders(), order)?;
        ensure_visible(&*self.store, principal, &order)?;
        let invoice = self.invoice_radiology_order(order, hospital, now)?;
        Ok(InvoiceReceipt::from(&invoice))
    }

    /// Bill an imaging order at the examination fee and link the invoice
    /// back to the order.
    pub fn invoice_radiology_order(
        &self,
        mut order: RadiologyOrder,
        hospital: Option<HospitalId>,
        now: NaiveDateTime,
    ) -> Result<Invoice, ServiceError> {
        let hospital = hospital
            .or_else(|| order.hospital.clone())
            .ok_or_else(|| ServiceError::validation("Hospital not specified"))?;
        let reference = ClinicalReference::RadiologyOrder(order.id.clone());
        self.ensure_not_invoiced(&reference)?;

        let fee = self
            .store
            .examination_types()
            .fetch(&order.examination_type)?
            .map_or(order.rate, |examination| examination.fee);
        let exam_name = order.examination_type.to_string();
        let item = InvoiceItem::new(
            format!("Radiology - {exam_name}"),
            format!("Radiology Examination: {exam_name}"),
            1.0,
            fee,
        );
        let invoice = self.raise(
            &order.patient,
            Some(hospital),
            ServiceType::Radiology,
            Some(reference),
            vec![item],
            now,
        )?;

        order.invoiced = true;
        order.sales_invoice = Some(invoice.id.clone());
        self.store.radiology_orders().update(order)?;
        Ok(invoice)
    }

    pub fn create_pharmacy_invoice(
        &self,
        principal: &Principal,
        prescription: &PrescriptionId,
        hospital: Option<HospitalId>,
        now: NaiveDateTime,
    ) -> Result<InvoiceReceipt, ServiceError> {
        let prescription = require(self.store.prescriptions(), prescription)?;
        ensure_visible(&*self.store, principal, &prescription)?;
        let invoice = self.invoice_prescription(prescription, hospital, now)?;
        Ok(InvoiceReceipt::from(&invoice))
    }

    /// One line per dispensed medication.
    pub fn invoice_prescription(
        &self,
        mut prescription: Prescription,
        hospital: Option<HospitalId>,
        now: NaiveDateTime,
    ) -> Result<Invoice, ServiceError> {
        let hospital = hospital
            .or_else(|| prescription.hospital.clone())
            .ok_or_else(|| ServiceError::validation("Hospital not specified"))?;
        let reference = ClinicalReference::Prescription(prescription.id.clone());
        self.ensure_not_invoiced(&reference)?;

        let items: Vec<InvoiceItem> = prescription
            .dispensed_items()
            .map(|item| {
                let qty = if item.dispensed_qty > 0.0 {
                    item.dispensed_qty
                } else {
                    1.0
                };
                InvoiceItem::new(
                    item.drug_name.clone(),
                    format!(
                        "{} - {} x {}",
                        item.drug_name,
                        item.dosage.as_deref().unwrap_or_default(),
                        qty
                    ),
                    qty,
                    item.rate,
                )
            })
            .collect();
        if items.is_empty() {
            return Err(ServiceError::validation("No dispensed items to invoice"));
        }
        let invoice = self.raise(
            &prescription.patient,
            Some(hospital),
            ServiceType::Pharmacy,
            Some(reference),
            items,
            now,
        )?;

        prescription.sales_invoice = Some(invoice.id.clone());
        self.store.prescriptions().update(prescription)?;
        Ok(invoice)
    }

    /// Bill a confirmed appointment at the practitioner's consulting
    /// charge. Nothing is raised when there is no charge.
    pub fn invoice_appointment(
        &self,
        appointment: &Appointment,
        now: NaiveDateTime,
    ) -> Result<Option<Invoice>, ServiceError> {
        let Some(practitioner) = appointment.practitioner.as_ref() else {
            return Ok(None);
        };
        let practitioner = require(self.store.practitioners(), practitioner)?;
        if practitioner.consulting_charge <= 0.0 {
            debug!(appointment = %appointment.id, "no consulting charge, skipping invoice");
            return Ok(None);
        }
        let reference = ClinicalReference::Appointment(appointment.id.clone());
        self.ensure_not_invoiced(&reference)?;

        let item = InvoiceItem::new(
            format!("Consultation - {}", practitioner.practitioner_name),
            format!(
                "Appointment on {} with {}",
                appointment.appointment_date, practitioner.practitioner_name
            ),
            1.0,
            practitioner.consulting_charge,
        );
        let invoice = self.raise(
            &appointment.patient,
            appointment.hospital.clone(),
            ServiceType::Appointment,
            Some(reference),
            vec![item],
            now,
        )?;
        Ok(Some(invoice))
    }

    /// Record a payment, submitting the invoice first when it is a draft.
    pub fn record_payment(
        &self,
        principal: &Principal,
        invoice: &InvoiceId,
        amount: f64,
        mode_of_payment: &str,
        today: NaiveDate,
    ) -> Result<PaymentReceipt, ServiceError> {
        if amount.is_nan() || amount <= 0.0 {
            return Err(ServiceError::validation(
                "Payment amount must be greater than 0",
            ));
        }
        let mut invoice = require(self.store.invoices(), invoice)?;
        ensure_visible(&*self.store, principal, &invoice)?;
        if invoice.docstatus == DocStatus::Cancelled {
            return Err(ServiceError::validation(
                "Cannot record payment against a cancelled invoice",
            ));
        }
        let outstanding = round_to(invoice.outstanding_amount, 2);
        if outstanding <= 0.0 {
            return Err(ServiceError::validation(format!(
                "Invoice {} is already paid",
                invoice.id
            )));
        }
        if round_to(amount, 2) > outstanding {
            return Err(ServiceError::validation(format!(
                "Payment of {amount:.2} exceeds the outstanding amount of {outstanding:.2}"
            )));
        }
        if invoice.docstatus == DocStatus::Draft {
            invoice.docstatus = DocStatus::Submitted;
            info!(invoice = %invoice.id, "invoice submitted for payment");
        }

        let payments = self.store.payments();
        let id = PaymentId::new(next_document_name(&*self.store, payments, "PAY")?);
        let payment = payments.insert(Payment {
            id,
            invoice: invoice.id.clone(),
            customer: invoice.customer.clone(),
            amount,
            mode_of_payment: mode_of_payment.to_string(),
            posting_date: today,
            hospital: invoice.hospital.clone(),
        })?;

        invoice.outstanding_amount = round_to((outstanding - amount).max(0.0), 2);
        self.store.invoices().update(invoice.clone())?;
        self.update_payment_status(&invoice)?;

        info!(
            invoice = %invoice.id,
            payment = %payment.id,
            amount,
            outstanding = invoice.outstanding_amount,
            "payment recorded"
        );
        Ok(PaymentReceipt {
            payment: payment.id,
            amount: payment.amount,
            outstanding_amount: invoice.outstanding_amount,
        })
    }

    fn update_payment_status(&self, invoice: &Invoice) -> Result<(), ServiceError> {
        let Some(ClinicalReference::LabTest(test)) = invoice.reference.as_ref() else {
            return Ok(());
        };
        let Some(mut test) = self.store.lab_tests().fetch(test)? else {
            return Ok(());
        };
        let status = if invoice.outstanding_amount <= 0.0 {
            PaymentStatus::Paid
        } else if invoice.outstanding_amount < invoice.grand_total {
            PaymentStatus::Partial
        } else {
            return Ok(());
        };
        test.payment_status = Some(status);
        self.store.lab_tests().update(test)?;
        Ok(())
    }

    /// Remove draft invoices raised for a clinical event that was withdrawn.
    /// Submitted invoices stay on the books.
    pub fn delete_draft_invoice(
        &self,
        reference: &ClinicalReference,
    ) -> Result<Vec<InvoiceId>, ServiceError> {
        let invoices = self.store.invoices();
        let drafts = invoices.select(&|invoice: &Invoice| {
            invoice.bills(reference) && invoice.docstatus == DocStatus::Draft
        })?;
        let mut removed = Vec::with_capacity(drafts.len());
        for invoice in drafts {
            invoices.remove(&invoice.id)?;
            info!(invoice = %invoice.id, %reference, "draft invoice deleted");
            removed.push(invoice.id);
        }
        Ok(removed)
    }

    /// Revenue over submitted invoices posted in the window. Defaults to
    /// today.
    pub fn billing_summary(
        &self,
        principal: &Principal,
        hospital: Option<HospitalId>,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<BillingSummary, ServiceError> {
        let scope = read_scope(&*self.store, principal, hospital)?;
        let from_date = from_date.unwrap_or(today);
        let to_date = to_date.unwrap_or(today);
        let invoices = self.submitted_between(&scope, from_date, to_date)?;

        let mut by_service: BTreeMap<&'static str, ServiceRevenue> = BTreeMap::new();
        for invoice in &invoices {
            let entry = by_service
                .entry(invoice.service_type.label())
                .or_insert_with(|| ServiceRevenue {
                    service_type: invoice.service_type,
                    total: 0.0,
                    count: 0,
                });
            entry.total += invoice.grand_total;
            entry.count += 1;
        }

        let total_revenue: f64 = invoices.iter().map(|invoice| invoice.grand_total).sum();
        let outstanding: f64 = invoices
            .iter()
            .map(|invoice| invoice.outstanding_amount)
            .sum();
        Ok(BillingSummary {
            total_revenue,
            outstanding,
            collected: total_revenue - outstanding,
            by_service: by_service.into_values().collect(),
            from_date,
            to_date,
        })
    }

    /// Submitted invoices with money still owed, newest first.
    pub fn pending_payments(
        &self,
        principal: &Principal,
        hospital: Option<HospitalId>,
        limit: Option<usize>,
    ) -> Result<Vec<PendingPayment>, ServiceError> {
        let scope = read_scope(&*self.store, principal, hospital)?;
        let mut pending = self.store.invoices().select(&|invoice: &Invoice| {
            invoice.docstatus.is_submitted()
                && invoice.outstanding_amount > 0.0
                && scope.allows_record(invoice)
        })?;
        pending.sort_by(|a, b| {
            b.posting_date
                .cmp(&a.posting_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        pending.truncate(limit.unwrap_or(PENDING_PAYMENTS_LIMIT));
        Ok(pending.into_iter().map(PendingPayment::from).collect())
    }

    /// Submitted revenue for one scope and window, used by dashboards.
    pub fn hospital_revenue(
        &self,
        scope: &TenantFilter,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<f64, ServiceError> {
        Ok(self
            .submitted_between(scope, from_date, to_date)?
            .iter()
            .map(|invoice| invoice.grand_total)
            .sum())
    }

    fn submitted_between(
        &self,
        scope: &TenantFilter,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<Vec<Invoice>, ServiceError> {
        Ok(self.store.invoices().select(&|invoice: &Invoice| {
            invoice.docstatus.is_submitted()
                && invoice.posting_date >= from_date
                && invoice.posting_date <= to_date
                && scope.allows_record(invoice)
        })?)
    }

    fn ensure_not_invoiced(&self, reference: &ClinicalReference) -> Result<(), ServiceError> {
        let existing = self
            .store
            .invoices()
            .select(&|invoice: &Invoice| invoice.is_live() && invoice.bills(reference))?;
        match existing.into_iter().next() {
            Some(invoice) => Err(ServiceError::AlreadyInvoiced {
                reference: reference.to_string(),
                invoice: invoice.id.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn raise(
        &self,
        patient: &PatientId,
        hospital: Option<HospitalId>,
        service_type: ServiceType,
        reference: Option<ClinicalReference>,
        items: Vec<InvoiceItem>,
        now: NaiveDateTime,
    ) -> Result<Invoice, ServiceError> {
        let customer = self.customer_for(patient)?;
        let invoices = self.store.invoices();
        let id = InvoiceId::new(next_document_name(&*self.store, invoices, "SINV")?);
        let mut invoice = Invoice {
            id,
            customer,
            patient: patient.clone(),
            hospital,
            service_type,
            reference,
            items,
            grand_total: 0.0,
            outstanding_amount: 0.0,
            docstatus: DocStatus::Draft,
            posting_date: now.date(),
            due_date: now.date(),
            created_at: now,
        };
        invoice.recalculate();
        invoice.outstanding_amount = invoice.grand_total;
        let invoice = invoices.insert(invoice)?;
        info!(
            invoice = %invoice.id,
            service = %invoice.service_type,
            total = invoice.grand_total,
            "invoice raised"
        );
        Ok(invoice)
    }

    /// Billing customer for a patient, created and linked on first use.
    fn customer_for(&self, patient: &PatientId) -> Result<CustomerId, ServiceError> {
        let mut patient = require(self.store.patients(), patient)?;
        if let Some(customer) = patient.customer.as_ref() {
            if self.store.customers().fetch(customer)?.is_some() {
                return Ok(customer.clone());
            }
        }

        let customers = self.store.customers();
        let patient_id = patient.id.clone();
        let customer = match customers
            .select(&|customer: &Customer| customer.patient.as_ref() == Some(&patient_id))?
            .into_iter()
            .next()
        {
            Some(customer) => customer,
            None => {
                let id = CustomerId::new(next_document_name(&*self.store, customers, "CUST")?);
                customers.insert(Customer {
                    id,
                    customer_name: patient.patient_name.clone(),
                    patient: Some(patient.id.clone()),
                    hospital: patient.hospital.clone(),
                })?
            }
        };

        patient.customer = Some(customer.id.clone());
        self.store.patients().update(patient)?;
        Ok(customer.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{LabTemplateId, PractitionerId};
    use crate::store::MemoryStore;
    use crate::tenancy::Practitioner;
    use crate::workflows::lab::LabTemplate;
    use crate::workflows::registry::Patient;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("timestamp")
    }

    fn admin() -> Principal {
        Principal::new(Principal::ADMINISTRATOR, "Administrator")
    }

    fn billing() -> BillingService<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store
            .patients()
            .insert(Patient::fixture("PAT-00001", Some("H1")))
            .expect("patient");
        store
            .practitioners()
            .insert(Practitioner {
                id: PractitionerId::from("HLC-PRAC-0001"),
                practitioner_name: "Dr. Mehta".to_string(),
                user: None,
                hospital: Some(HospitalId::from("H1")),
                department: None,
                designation: None,
                consulting_charge: 500.0,
            })
            .expect("practitioner");
        store
            .lab_templates()
            .insert(LabTemplate {
                id: LabTemplateId::from("CBC"),
                lab_test_name: "Complete Blood Count".to_string(),
                test_fee: 300.0,
                hospital: Some(HospitalId::from("H1")),
            })
            .expect("template");
        let mut test = LabTest::fixture("LT-00001", Some("H1"));
        test.template = Some(LabTemplateId::from("CBC"));
        store.lab_tests().insert(test).expect("lab test");
        BillingService::new(store)
    }

    #[test]
    fn consultation_uses_the_consulting_charge_and_links_a_customer() {
        let billing = billing();
        let receipt = billing
            .create_consultation_invoice(
                &admin(),
                ConsultationInvoiceRequest {
                    patient: PatientId::from("PAT-00001"),
                    practitioner: PractitionerId::from("HLC-PRAC-0001"),
                    hospital: None,
                    amount: None,
                    encounter: None,
                },
                at(1, 10),
            )
            .expect("invoice");
        assert_eq!(receipt.invoice.as_str(), "SINV-00001");
        assert_eq!(receipt.amount, 500.0);

        let invoice = require(billing.store.invoices(), &receipt.invoice).expect("stored");
        assert_eq!(invoice.hospital, Some(HospitalId::from("H1")));
        assert_eq!(invoice.items[0].item_name, "OPD Consultation - Dr. Mehta");
        assert_eq!(invoice.docstatus, DocStatus::Draft);
        let patient = require(billing.store.patients(), &PatientId::from("PAT-00001"))
            .expect("patient");
        assert_eq!(patient.customer, Some(CustomerId::from("CUST-00001")));
    }

    #[test]
    fn second_invoice_for_the_same_lab_test_is_rejected() {
        let billing = billing();
        let first = billing
            .create_lab_invoice(&admin(), &LabTestId::from("LT-00001"), None, at(1, 10))
            .expect("first");
        assert_eq!(first.amount, 300.0);

        match billing.create_lab_invoice(&admin(), &LabTestId::from("LT-00001"), None, at(1, 11)) {
            Err(ServiceError::AlreadyInvoiced { reference, invoice }) => {
                assert_eq!(reference, "Lab Test LT-00001");
                assert_eq!(invoice, first.invoice.to_string());
            }
            other => panic!("expected duplicate rejection, got {other:?}"),
        }
        assert_eq!(
            billing.store.invoices().count(&|_: &Invoice| true).expect("count"),
            1
        );
    }

    #[test]
    fn payments_submit_the_invoice_and_settle_the_lab_test() {
        let billing = billing();
        let receipt = billing
            .create_lab_invoice(&admin(), &LabTestId::from("LT-00001"), None, at(1, 10))
            .expect("invoice");
        let today = at(1, 0).date();

        assert!(billing
            .record_payment(&admin(), &receipt.invoice, 0.0, "Cash", today)
            .is_err());
        let partial = billing
            .record_payment(&admin(), &receipt.invoice, 100.0, "Cash", today)
            .expect("partial");
        assert_eq!(partial.outstanding_amount, 200.0);
        let test = require(billing.store.lab_tests(), &LabTestId::from("LT-00001")).expect("test");
        assert_eq!(test.payment_status, Some(PaymentStatus::Partial));

        billing
            .record_payment(&admin(), &receipt.invoice, 200.0, "UPI", today)
            .expect("settled");
        let test = require(billing.store.lab_tests(), &LabTestId::from("LT-00001")).expect("test");
        assert_eq!(test.payment_status, Some(PaymentStatus::Paid));

        let summary = billing
            .billing_summary(&admin(), None, None, None, today)
            .expect("summary");
        assert_eq!(summary.total_revenue, 300.0);
        assert_eq!(summary.collected, 300.0);
        assert_eq!(summary.by_service.len(), 1);
        assert_eq!(summary.by_service[0].service_type, ServiceType::LabTest);
        assert!(billing
            .pending_payments(&admin(), None, None)
            .expect("pending")
            .is_empty());
    }

    #[test]
    fn payments_cannot_exceed_the_outstanding_amount() {
        let billing = billing();
        let receipt = billing
            .create_lab_invoice(&admin(), &LabTestId::from("LT-00001"), None, at(1, 10))
            .expect("invoice");
        let today = at(1, 0).date();

        let over = billing.record_payment(&admin(), &receipt.invoice, 1000.0, "Cash", today);
        assert!(matches!(over, Err(ServiceError::Validation(_))));
        let untouched = require(billing.store.invoices(), &receipt.invoice).expect("invoice");
        assert_eq!(untouched.outstanding_amount, 300.0);
        assert_eq!(untouched.docstatus, DocStatus::Draft);
        assert_eq!(
            billing.store.payments().count(&|_: &Payment| true).expect("count"),
            0
        );

        billing
            .record_payment(&admin(), &receipt.invoice, 300.0, "Cash", today)
            .expect("exact settlement");
        match billing.record_payment(&admin(), &receipt.invoice, 50.0, "Cash", today) {
            Err(ServiceError::Validation(message)) => {
                assert_eq!(message, format!("Invoice {} is already paid", receipt.invoice))
            }
            other => panic!("expected rejection of a settled invoice, got {other:?}"),
        }

        let collected: f64 = billing
            .store
            .payments()
            .select(&|_: &Payment| true)
            .expect("payments")
            .iter()
            .map(|payment| payment.amount)
            .sum();
        assert_eq!(collected, 300.0);
        let summary = billing
            .billing_summary(&admin(), None, None, None, today)
            .expect("summary");
        assert_eq!(summary.collected, collected);
    }

    #[test]
    fn drafts_do_not_count_as_revenue_and_can_be_withdrawn() {
        let billing = billing();
        let receipt = billing
            .create_lab_invoice(&admin(), &LabTestId::from("LT-00001"), None, at(1, 10))
            .expect("invoice");
        let summary = billing
            .billing_summary(&admin(), None, None, None, at(1, 0).date())
            .expect("summary");
        assert_eq!(summary.total_revenue, 0.0);

        let reference = ClinicalReference::LabTest(LabTestId::from("LT-00001"));
        let removed = billing.delete_draft_invoice(&reference).expect("deleted");
        assert_eq!(removed, vec![receipt.invoice]);
        billing
            .create_lab_invoice(&admin(), &LabTestId::from("LT-00001"), None, at(1, 11))
            .expect("billable again");
    }
}
