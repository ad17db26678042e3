use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::ids::{AdmissionId, HospitalId, PatientId, PractitionerId};
use crate::sequence::format_identifier;
use crate::store::Record;
use crate::workflows::{round_to, ServiceError};

labelled_status!(
    AdmissionStatus, "IPD Admission" {
        Admitted => "Admitted",
        InTreatment => "In Treatment",
        Discharged => "Discharged",
    }
);

impl AdmissionStatus {
    /// Occupying a bed.
    pub const ACTIVE: [Self; 2] = [Self::Admitted, Self::InTreatment];

    pub fn can_transition_to(self, next: Self) -> bool {
        use AdmissionStatus::*;
        matches!(
            (self, next),
            (Admitted, InTreatment | Discharged) | (InTreatment, Discharged)
        )
    }

    pub fn ensure_transition(self, next: Self) -> Result<(), ServiceError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(ServiceError::IllegalTransition {
                kind: Admission::KIND,
                from: self.label(),
                to: next.label(),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admission {
    pub id: AdmissionId,
    /// `IPD001`, restarting every month per tenant.
    pub admission_id: String,
    pub patient: PatientId,
    pub patient_name: String,
    pub age: Option<String>,
    pub mobile: Option<String>,
    pub hospital: Option<HospitalId>,
    pub ward: Option<String>,
    pub room: Option<String>,
    pub bed: Option<String>,
    pub practitioner: Option<PractitionerId>,
    pub diagnosis: Option<String>,
    pub admission_date: NaiveDate,
    pub status: AdmissionStatus,
    pub total_billed: f64,
    pub advance_paid: f64,
    pub balance_due: f64,
    pub actual_discharge: Option<NaiveDateTime>,
    pub discharge_type: Option<String>,
    pub discharge_summary: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Admission {
    pub fn display_id(sequence: u32) -> String {
        format_identifier("IPD", sequence, 3)
    }

    pub fn is_active(&self) -> bool {
        AdmissionStatus::ACTIVE.contains(&self.status)
    }

    pub fn recalculate_balance(&mut self) {
        self.balance_due = round_to(self.total_billed - self.advance_paid, 2);
    }
}

impl Record for Admission {
    type Id = AdmissionId;
    const KIND: &'static str = "IPD Admission";

    fn id(&self) -> &AdmissionId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionRequest {
    pub patient: PatientId,
    #[serde(default)]
    pub practitioner: Option<PractitionerId>,
    #[serde(default)]
    pub ward: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub bed: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub admission_date: Option<NaiveDate>,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DischargeRequest {
    #[serde(default = "DischargeRequest::normal")]
    pub discharge_type: String,
    #[serde(default)]
    pub summary: String,
}

impl DischargeRequest {
    fn normal() -> String {
        "Normal".to_string()
    }
}

impl Default for DischargeRequest {
    fn default() -> Self {
        Self {
            discharge_type: Self::normal(),
            summary: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DischargeOutcome {
    pub message: String,
    pub admission: Admission,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvanceReceipt {
    pub message: String,
    pub total_advance: f64,
    pub balance_due: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingUpdate {
    pub total_billed: f64,
    pub balance_due: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IpdDashboard {
    pub admissions: Vec<Admission>,
    pub total_beds: u32,
    pub occupied_beds: u32,
    pub available_beds: u32,
    pub occupancy_rate: f64,
}
