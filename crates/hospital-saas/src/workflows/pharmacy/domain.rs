use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::ids::{
    HospitalId, InvoiceId, MedicationId, PatientId, PharmacyId, PractitionerId, PrescriptionId,
    PrincipalId,
};
use crate::store::Record;
use crate::workflows::{DocStatus, ServiceError};

labelled_status!(
    /// Dispensing progress of a prescription.
    PrescriptionStatus, "Pharmacy Prescription" {
        Draft => "Draft",
        Pending => "Pending",
        PartiallyDispensed => "Partially Dispensed",
        Dispensed => "Dispensed",
        Cancelled => "Cancelled",
    }
);

impl PrescriptionStatus {
    /// Statuses shown on the pharmacy counter.
    pub const OPEN: [Self; 2] = [Self::Pending, Self::PartiallyDispensed];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub id: MedicationId,
    pub medication_name: String,
    #[serde(default)]
    pub standard_rate: f64,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

impl Record for Medication {
    type Id = MedicationId;
    const KIND: &'static str = "Item";

    fn id(&self) -> &MedicationId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MedicationDraft {
    pub medication_name: String,
    #[serde(default)]
    pub standard_rate: f64,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pharmacy {
    pub id: PharmacyId,
    pub pharmacy_name: String,
    /// `{hospital_code}-PH{nn}`, generated when left empty.
    pub pharmacy_code: String,
    pub hospital: Option<HospitalId>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_warehouse: bool,
}

impl Record for Pharmacy {
    type Id = PharmacyId;
    const KIND: &'static str = "Pharmacy";

    fn id(&self) -> &PharmacyId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

fn active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct PharmacyDraft {
    pub pharmacy_name: String,
    #[serde(default)]
    pub pharmacy_code: Option<String>,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_warehouse: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionItem {
    pub medication: MedicationId,
    pub drug_name: String,
    #[serde(default)]
    pub dosage: Option<String>,
    pub quantity: f64,
    pub rate: f64,
    pub amount: f64,
    #[serde(default)]
    pub is_dispensed: bool,
    #[serde(default)]
    pub dispensed_qty: f64,
    #[serde(default)]
    pub dispensed_by: Option<PrincipalId>,
    #[serde(default)]
    pub dispensed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: PrescriptionId,
    pub patient: PatientId,
    pub patient_name: String,
    pub practitioner: Option<PractitionerId>,
    pub practitioner_name: Option<String>,
    pub pharmacy: Option<PharmacyId>,
    pub hospital: Option<HospitalId>,
    pub prescription_date: NaiveDate,
    pub items: Vec<PrescriptionItem>,
    pub total_quantity: f64,
    pub total_amount: f64,
    pub discount_amount: f64,
    /// Total less discount, recomputed on every save.
    pub net_amount: f64,
    pub status: PrescriptionStatus,
    pub docstatus: DocStatus,
    pub dispensed_by: Option<PrincipalId>,
    pub dispensed_at: Option<NaiveDateTime>,
    pub sales_invoice: Option<InvoiceId>,
    pub created_at: NaiveDateTime,
}

impl Prescription {
    pub fn recalculate(&mut self) {
        let mut total_quantity = 0.0;
        let mut total_amount = 0.0;
        for item in &mut self.items {
            item.amount = item.quantity * item.rate;
            total_quantity += item.quantity;
            total_amount += item.amount;
        }
        self.total_quantity = total_quantity;
        self.total_amount = total_amount;
        self.net_amount = total_amount - self.discount_amount;
    }

    /// Status implied by the document state and the dispensed lines.
    pub fn derived_status(&self) -> PrescriptionStatus {
        match self.docstatus {
            DocStatus::Draft => PrescriptionStatus::Draft,
            DocStatus::Cancelled => PrescriptionStatus::Cancelled,
            DocStatus::Submitted => {
                let dispensed = self.items.iter().filter(|item| item.is_dispensed).count();
                if dispensed == 0 {
                    PrescriptionStatus::Pending
                } else if dispensed == self.items.len() {
                    PrescriptionStatus::Dispensed
                } else {
                    PrescriptionStatus::PartiallyDispensed
                }
            }
        }
    }

    pub fn dispensed_items(&self) -> impl Iterator<Item = &PrescriptionItem> {
        self.items.iter().filter(|item| item.is_dispensed)
    }
}

impl Record for Prescription {
    type Id = PrescriptionId;
    const KIND: &'static str = "Pharmacy Prescription";

    fn id(&self) -> &PrescriptionId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrescriptionLine {
    #[serde(default)]
    pub medication: Option<MedicationId>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub quantity: f64,
    /// Zero falls back to the medication's standard rate.
    #[serde(default)]
    pub rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrescriptionRequest {
    pub patient: PatientId,
    #[serde(default)]
    pub practitioner: Option<PractitionerId>,
    #[serde(default)]
    pub pharmacy: Option<PharmacyId>,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
    #[serde(default)]
    pub prescription_date: Option<NaiveDate>,
    #[serde(default)]
    pub discount_amount: f64,
    pub items: Vec<PrescriptionLine>,
}

/// Row numbers in messages are 1-based, as on the form.
pub fn validate_lines(lines: &[PrescriptionLine]) -> Result<(), ServiceError> {
    for (index, line) in lines.iter().enumerate() {
        let row = index + 1;
        if line.medication.is_none() {
            return Err(ServiceError::validation(format!(
                "Row {row}: Please select a medication"
            )));
        }
        if line.quantity.is_nan() || line.quantity <= 0.0 {
            return Err(ServiceError::validation(format!(
                "Row {row}: Quantity must be greater than 0"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispenseOutcome {
    pub success: bool,
    pub message: String,
    pub prescription: Prescription,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PharmacyQueueEntry {
    pub name: PrescriptionId,
    pub patient: PatientId,
    pub patient_name: String,
    pub prescription_date: NaiveDate,
    pub practitioner_name: Option<String>,
    pub status: PrescriptionStatus,
    pub total_amount: f64,
    pub creation: NaiveDateTime,
}

impl From<Prescription> for PharmacyQueueEntry {
    fn from(prescription: Prescription) -> Self {
        Self {
            name: prescription.id,
            patient: prescription.patient,
            patient_name: prescription.patient_name,
            prescription_date: prescription.prescription_date,
            practitioner_name: prescription.practitioner_name,
            status: prescription.status,
            total_amount: prescription.total_amount,
            creation: prescription.created_at,
        }
    }
}
