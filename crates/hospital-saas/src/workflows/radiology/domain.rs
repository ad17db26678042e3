use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::ids::{
    ExaminationTypeId, HospitalId, InvoiceId, PatientId, PractitionerId, PrincipalId,
    RadiologyOrderId, RadiologyResultId,
};
use crate::store::Record;
use crate::workflows::{DocStatus, ServiceError};

labelled_status!(
    Modality, "modality" {
        XRay => "X-Ray",
        CtScan => "CT Scan",
        Mri => "MRI",
        Ultrasound => "Ultrasound",
        Mammography => "Mammography",
        Fluoroscopy => "Fluoroscopy",
        NuclearMedicine => "Nuclear Medicine",
        PetScan => "PET Scan",
        DexaScan => "DEXA Scan",
        Angiography => "Angiography",
        Other => "Other",
    }
);

impl Modality {
    pub const fn code_prefix(self) -> &'static str {
        match self {
            Self::XRay => "XR",
            Self::CtScan => "CT",
            Self::Mri => "MR",
            Self::Ultrasound => "US",
            Self::Mammography => "MG",
            Self::Fluoroscopy => "FL",
            Self::NuclearMedicine => "NM",
            Self::PetScan => "PT",
            Self::DexaScan => "DX",
            Self::Angiography => "AG",
            Self::Other => "RD",
        }
    }
}

labelled_status!(
    Priority, "priority" {
        Stat => "STAT",
        Urgent => "Urgent",
        Routine => "Routine",
    }
);

impl Priority {
    /// Queue order: STAT first.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Stat => 0,
            Self::Urgent => 1,
            Self::Routine => 2,
        }
    }
}

labelled_status!(
    OrderStatus, "Radiology Order" {
        Draft => "Draft",
        Ordered => "Ordered",
        Scheduled => "Scheduled",
        InProgress => "In Progress",
        Completed => "Completed",
        Cancelled => "Cancelled",
    }
);

impl OrderStatus {
    /// Waiting for or undergoing the examination.
    pub const PENDING: [Self; 3] = [Self::Ordered, Self::Scheduled, Self::InProgress];

    pub fn can_transition_to(self, next: Self) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Ordered, Scheduled | InProgress | Cancelled)
                | (Scheduled, InProgress | Cancelled)
                | (InProgress, Completed | Cancelled)
        )
    }

    pub fn ensure_transition(self, next: Self) -> Result<(), ServiceError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(ServiceError::IllegalTransition {
                kind: RadiologyOrder::KIND,
                from: self.label(),
                to: next.label(),
            })
        }
    }
}

labelled_status!(
    ResultStatus, "Radiology Result" {
        Draft => "Draft",
        PendingReview => "Pending Review",
        Approved => "Approved",
    }
);

/// `{modality prefix}-{initials of the first three words}`, e.g. `CT-HC`.
pub fn examination_code(modality: Modality, examination_name: &str) -> String {
    let initials: String = examination_name
        .split_whitespace()
        .take(3)
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect();
    format!("{}-{initials}", modality.code_prefix())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExaminationType {
    pub id: ExaminationTypeId,
    pub examination_name: String,
    pub examination_code: String,
    pub modality: Modality,
    pub fee: f64,
    pub duration_minutes: u32,
    pub hospital: Option<HospitalId>,
}

impl Record for ExaminationType {
    type Id = ExaminationTypeId;
    const KIND: &'static str = "Radiology Examination Type";

    fn id(&self) -> &ExaminationTypeId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExaminationTypeDraft {
    pub examination_name: String,
    pub modality: Modality,
    #[serde(default)]
    pub examination_code: Option<String>,
    #[serde(default)]
    pub fee: f64,
    #[serde(default)]
    pub duration_minutes: i64,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiologyOrder {
    pub id: RadiologyOrderId,
    pub patient: PatientId,
    pub patient_name: String,
    pub patient_sex: Option<String>,
    pub examination_type: ExaminationTypeId,
    pub modality: Modality,
    pub body_part: Option<String>,
    pub practitioner: Option<PractitionerId>,
    pub practitioner_name: Option<String>,
    pub priority: Priority,
    pub status: OrderStatus,
    pub docstatus: DocStatus,
    pub order_date: NaiveDate,
    pub order_time: NaiveTime,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub radiology_room: Option<String>,
    pub technician: Option<String>,
    pub clinical_history: Option<String>,
    /// Examination fee captured when the order was placed.
    pub rate: f64,
    pub invoiced: bool,
    pub sales_invoice: Option<InvoiceId>,
    pub hospital: Option<HospitalId>,
    pub created_at: NaiveDateTime,
}

impl RadiologyOrder {
    pub fn title(&self) -> String {
        format!("{} - {}", self.patient_name, self.examination_type)
    }

    pub fn ordered_at(&self) -> NaiveDateTime {
        self.order_date.and_time(self.order_time)
    }

    pub fn is_pending(&self) -> bool {
        self.docstatus.is_submitted() && OrderStatus::PENDING.contains(&self.status)
    }

    /// Same room and slot as `other`, while both are still live.
    pub fn collides_with(&self, other: &RadiologyOrder) -> bool {
        self.id != other.id
            && other.docstatus.is_submitted()
            && !matches!(other.status, OrderStatus::Completed | OrderStatus::Cancelled)
            && self.hospital == other.hospital
            && self.radiology_room.is_some()
            && self.radiology_room == other.radiology_room
            && self.scheduled_date.is_some()
            && self.scheduled_date == other.scheduled_date
            && self.scheduled_time.is_some()
            && self.scheduled_time == other.scheduled_time
    }
}

impl Record for RadiologyOrder {
    type Id = RadiologyOrderId;
    const KIND: &'static str = "Radiology Order";

    fn id(&self) -> &RadiologyOrderId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

fn routine() -> Priority {
    Priority::Routine
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    pub patient: PatientId,
    pub examination_type: ExaminationTypeId,
    #[serde(default)]
    pub practitioner: Option<PractitionerId>,
    #[serde(default = "routine")]
    pub priority: Priority,
    #[serde(default)]
    pub body_part: Option<String>,
    #[serde(default)]
    pub clinical_history: Option<String>,
    #[serde(default)]
    pub order_date: Option<NaiveDate>,
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub scheduled_time: Option<NaiveTime>,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    #[serde(default)]
    pub radiology_room: Option<String>,
    #[serde(default)]
    pub technician: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiologyResult {
    pub id: RadiologyResultId,
    pub radiology_order: Option<RadiologyOrderId>,
    pub patient: PatientId,
    pub patient_name: String,
    pub examination_type: ExaminationTypeId,
    pub modality: Modality,
    pub practitioner: Option<PractitionerId>,
    pub practitioner_name: Option<String>,
    pub examination_date: NaiveDate,
    pub examination_time: NaiveTime,
    pub findings: Option<String>,
    pub impression: Option<String>,
    pub status: ResultStatus,
    pub docstatus: DocStatus,
    pub reported_at: Option<NaiveDateTime>,
    pub approved_by: Option<PrincipalId>,
    pub approval_date: Option<NaiveDateTime>,
    pub hospital: Option<HospitalId>,
    pub created_at: NaiveDateTime,
}

impl RadiologyResult {
    pub fn examined_at(&self) -> NaiveDateTime {
        self.examination_date.and_time(self.examination_time)
    }
}

impl Record for RadiologyResult {
    type Id = RadiologyResultId;
    const KIND: &'static str = "Radiology Result";

    fn id(&self) -> &RadiologyResultId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultFindings {
    #[serde(default)]
    pub findings: Option<String>,
    #[serde(default)]
    pub impression: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RadiologyAck {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderStatusUpdate {
    pub success: bool,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadiologyStatistics {
    pub total_orders: usize,
    pub status_breakdown: Vec<LabelCount>,
    pub modality_breakdown: Vec<LabelCount>,
    pub pending_results: usize,
    pub avg_turnaround_hours: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_use_modality_prefix_and_initials() {
        assert_eq!(examination_code(Modality::CtScan, "head contrast study scan"), "CT-HCS");
        assert_eq!(examination_code(Modality::XRay, "Chest PA"), "XR-CP");
        assert_eq!(examination_code(Modality::Other, "bone density"), "RD-BD");
    }

    #[test]
    fn order_transitions_follow_the_table() {
        use OrderStatus::*;
        assert!(Ordered.ensure_transition(Scheduled).is_ok());
        assert!(Scheduled.ensure_transition(InProgress).is_ok());
        assert!(InProgress.ensure_transition(Completed).is_ok());
        assert!(Ordered.ensure_transition(Completed).is_err());
        assert!(Completed.ensure_transition(Cancelled).is_err());
        assert!(Draft.ensure_transition(Ordered).is_err());
    }

    #[test]
    fn labels_round_trip_through_parse() {
        assert_eq!(Priority::parse("STAT").expect("stat"), Priority::Stat);
        assert_eq!(Modality::parse("PET Scan").expect("pet"), Modality::PetScan);
        assert!(Priority::parse("stat").is_err());
        assert!(Priority::Stat.rank() < Priority::Routine.rank());
    }
}
