use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::ids::{
    AppointmentId, CustomerId, HospitalId, InvoiceId, LabTestId, PatientId, PaymentId,
    PractitionerId, PrescriptionId, RadiologyOrderId,
};
use crate::store::Record;
use crate::workflows::DocStatus;

labelled_status!(
    /// Revenue stream an invoice is booked under.
    ServiceType, "service type" {
        OpdConsultation => "OPD Consultation",
        LabTest => "Lab Test",
        Radiology => "Radiology",
        Pharmacy => "Pharmacy",
        Appointment => "Appointment",
    }
);

/// Clinical event an invoice bills for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "doctype", content = "name")]
pub enum ClinicalReference {
    #[serde(rename = "Lab Test")]
    LabTest(LabTestId),
    #[serde(rename = "Radiology Order")]
    RadiologyOrder(RadiologyOrderId),
    #[serde(rename = "Pharmacy Prescription")]
    Prescription(PrescriptionId),
    #[serde(rename = "Patient Appointment")]
    Appointment(AppointmentId),
    #[serde(rename = "Patient Encounter")]
    Encounter(String),
}

impl ClinicalReference {
    pub fn doctype(&self) -> &'static str {
        match self {
            Self::LabTest(_) => "Lab Test",
            Self::RadiologyOrder(_) => "Radiology Order",
            Self::Prescription(_) => "Pharmacy Prescription",
            Self::Appointment(_) => "Patient Appointment",
            Self::Encounter(_) => "Patient Encounter",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::LabTest(id) => id.as_str(),
            Self::RadiologyOrder(id) => id.as_str(),
            Self::Prescription(id) => id.as_str(),
            Self::Appointment(id) => id.as_str(),
            Self::Encounter(name) => name,
        }
    }
}

impl fmt::Display for ClinicalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.doctype(), self.name())
    }
}

/// Billing subject, one per patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub customer_name: String,
    #[serde(default)]
    pub patient: Option<PatientId>,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

impl Record for Customer {
    type Id = CustomerId;
    const KIND: &'static str = "Customer";

    fn id(&self) -> &CustomerId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub item_name: String,
    pub description: String,
    pub qty: f64,
    pub rate: f64,
    pub amount: f64,
}

impl InvoiceItem {
    pub fn new(
        item_name: impl Into<String>,
        description: impl Into<String>,
        qty: f64,
        rate: f64,
    ) -> Self {
        Self {
            item_name: item_name.into(),
            description: description.into(),
            qty,
            rate,
            amount: qty * rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub customer: CustomerId,
    pub patient: PatientId,
    /// Stored in the `custom_hospital` column.
    pub hospital: Option<HospitalId>,
    pub service_type: ServiceType,
    pub reference: Option<ClinicalReference>,
    pub items: Vec<InvoiceItem>,
    pub grand_total: f64,
    pub outstanding_amount: f64,
    pub docstatus: DocStatus,
    pub posting_date: NaiveDate,
    pub due_date: NaiveDate,
    pub created_at: NaiveDateTime,
}

impl Invoice {
    pub fn recalculate(&mut self) {
        for item in &mut self.items {
            item.amount = item.qty * item.rate;
        }
        self.grand_total = self.items.iter().map(|item| item.amount).sum();
    }

    /// Still counts against its reference for duplicate detection.
    pub fn is_live(&self) -> bool {
        self.docstatus != DocStatus::Cancelled
    }

    pub fn bills(&self, reference: &ClinicalReference) -> bool {
        self.reference.as_ref() == Some(reference)
    }
}

impl Record for Invoice {
    type Id = InvoiceId;
    const KIND: &'static str = "Sales Invoice";

    fn id(&self) -> &InvoiceId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice: InvoiceId,
    pub customer: CustomerId,
    pub amount: f64,
    pub mode_of_payment: String,
    pub posting_date: NaiveDate,
    pub hospital: Option<HospitalId>,
}

impl Record for Payment {
    type Id = PaymentId;
    const KIND: &'static str = "Payment Entry";

    fn id(&self) -> &PaymentId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsultationInvoiceRequest {
    pub patient: PatientId,
    pub practitioner: PractitionerId,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
    /// Defaults to the practitioner's consulting charge.
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub encounter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceReceipt {
    pub invoice: InvoiceId,
    pub amount: f64,
}

impl From<&Invoice> for InvoiceReceipt {
    fn from(invoice: &Invoice) -> Self {
        Self {
            invoice: invoice.id.clone(),
            amount: invoice.grand_total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentReceipt {
    pub payment: PaymentId,
    pub amount: f64,
    pub outstanding_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRevenue {
    pub service_type: ServiceType,
    pub total: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingSummary {
    pub total_revenue: f64,
    pub outstanding: f64,
    pub collected: f64,
    pub by_service: Vec<ServiceRevenue>,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingPayment {
    pub name: InvoiceId,
    pub customer: CustomerId,
    pub patient: PatientId,
    pub hospital: Option<HospitalId>,
    pub grand_total: f64,
    pub outstanding_amount: f64,
    pub posting_date: NaiveDate,
    pub service_type: ServiceType,
}

impl From<Invoice> for PendingPayment {
    fn from(invoice: Invoice) -> Self {
        Self {
            name: invoice.id,
            customer: invoice.customer,
            patient: invoice.patient,
            hospital: invoice.hospital,
            grand_total: invoice.grand_total,
            outstanding_amount: invoice.outstanding_amount,
            posting_date: invoice.posting_date,
            service_type: invoice.service_type,
        }
    }
}
