use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::ids::{AppointmentId, DepartmentId, HospitalId, PatientId, PractitionerId};
use crate::store::Record;
use crate::workflows::DocStatus;

labelled_status!(
    AppointmentStatus, "Patient Appointment" {
        Open => "Open",
        Scheduled => "Scheduled",
        Closed => "Closed",
        Cancelled => "Cancelled",
    }
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub patient: PatientId,
    pub patient_name: String,
    pub practitioner: Option<PractitionerId>,
    pub practitioner_name: Option<String>,
    pub department: Option<DepartmentId>,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub status: AppointmentStatus,
    pub docstatus: DocStatus,
    /// Filled from the practitioner or the booking user on submit.
    pub hospital: Option<HospitalId>,
    pub created_at: NaiveDateTime,
}

impl Record for Appointment {
    type Id = AppointmentId;
    const KIND: &'static str = "Patient Appointment";

    fn id(&self) -> &AppointmentId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentRequest {
    pub patient: PatientId,
    #[serde(default)]
    pub practitioner: Option<PractitionerId>,
    #[serde(default)]
    pub department: Option<DepartmentId>,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}
