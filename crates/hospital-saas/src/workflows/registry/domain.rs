use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::ids::{CustomerId, DepartmentId, HospitalId, PatientId, PractitionerId, PrincipalId};
use crate::store::Record;
use crate::tenancy::SubscriptionStatus;

/// Strip separators from a phone number, keeping digits and `+`.
pub fn normalise_mobile(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub patient_name: String,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub dob: Option<NaiveDate>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Stored in the `custom_hospital` column.
    #[serde(default)]
    pub hospital: Option<HospitalId>,
    /// Billing customer, linked on first invoice.
    #[serde(default)]
    pub customer: Option<CustomerId>,
    pub created_at: NaiveDateTime,
}

impl Patient {
    #[cfg(test)]
    pub(crate) fn fixture(id: &str, hospital: Option<&str>) -> Self {
        Self {
            id: PatientId::from(id),
            patient_name: "Asha Rao".to_string(),
            sex: None,
            dob: None,
            mobile: None,
            email: None,
            hospital: hospital.map(HospitalId::from),
            customer: None,
            created_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .and_then(|date| date.and_hms_opt(8, 0, 0))
                .expect("valid timestamp"),
        }
    }
}

impl Record for Patient {
    type Id = PatientId;
    const KIND: &'static str = "Patient";

    fn id(&self) -> &PatientId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatientDraft {
    pub patient_name: String,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub dob: Option<NaiveDate>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DepartmentStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub department_name: String,
    /// `{hospital_code}-{ABC}{nn}`, generated when left empty.
    pub department_code: String,
    pub hospital: Option<HospitalId>,
    #[serde(default)]
    pub parent_department: Option<DepartmentId>,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub department_head: Option<PractitionerId>,
    #[serde(default)]
    pub status: DepartmentStatus,
    #[serde(default)]
    pub consultation_rooms: u32,
    #[serde(default)]
    pub beds_allocated: u32,
    #[serde(default)]
    pub daily_opd_capacity: u32,
}

impl Department {
    /// First three letters of the name, upper-cased.
    pub fn code_prefix(department_name: &str) -> String {
        department_name
            .trim()
            .chars()
            .take(3)
            .collect::<String>()
            .to_uppercase()
    }
}

impl Record for Department {
    type Id = DepartmentId;
    const KIND: &'static str = "Department";

    fn id(&self) -> &DepartmentId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepartmentDraft {
    pub department_name: String,
    #[serde(default)]
    pub department_code: Option<String>,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
    #[serde(default)]
    pub parent_department: Option<DepartmentId>,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub department_head: Option<PractitionerId>,
    #[serde(default)]
    pub consultation_rooms: u32,
    #[serde(default)]
    pub beds_allocated: u32,
    #[serde(default)]
    pub daily_opd_capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentStats {
    pub name: DepartmentId,
    pub department_name: String,
    pub consultation_rooms: u32,
    pub beds_allocated: u32,
    pub daily_opd_capacity: u32,
    pub practitioners: usize,
    pub today_appointments: usize,
}

/// Result of the onboarding wizard. Admin creation failures are reported,
/// not raised; the hospital is kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WizardOutcome {
    pub hospital: HospitalId,
    pub organisation_code: String,
    pub business_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_user: Option<PrincipalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HospitalStats {
    pub name: HospitalId,
    pub organisation_code: String,
    pub business_name: String,
    pub total_beds: Option<u32>,
    pub icu_beds: u32,
    pub emergency_beds: u32,
    pub operation_theaters: u32,
    pub departments: usize,
    pub staff: usize,
    pub patients: usize,
    pub today_appointments: usize,
    pub active_tokens: usize,
    pub subscription_status: SubscriptionStatus,
    pub subscription_end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HospitalSummary {
    pub name: HospitalId,
    pub organisation_code: String,
    pub business_name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub hospital_type: Option<String>,
    pub status: crate::tenancy::HospitalStatus,
    pub subscription_status: SubscriptionStatus,
    pub subscription_end: Option<NaiveDate>,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
    pub owner_mobile: Option<String>,
    pub patient_count: usize,
    pub staff_count: usize,
}
