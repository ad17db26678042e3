use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::ids::{HospitalId, LabTemplateId, LabTestId, PatientId, PractitionerId};
use crate::store::Record;
use crate::workflows::{DocStatus, ServiceError};

labelled_status!(
    /// Position of a lab test on the laboratory board.
    LabQueueStatus, "Lab Test" {
        Waiting => "Waiting",
        SampleCollection => "Sample Collection",
        Processing => "Processing",
        Completed => "Completed",
    }
);

impl LabQueueStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        use LabQueueStatus::*;
        matches!(
            (self, next),
            (Waiting, SampleCollection) | (SampleCollection, Processing) | (Processing, Completed)
        )
    }

    pub fn ensure_transition(self, next: Self) -> Result<(), ServiceError> {
        if self == next || self.can_transition_to(next) {
            Ok(())
        } else {
            Err(ServiceError::IllegalTransition {
                kind: LabTest::KIND,
                from: self.label(),
                to: next.label(),
            })
        }
    }
}

labelled_status!(
    PaymentStatus, "payment status" {
        Pending => "Pending",
        Partial => "Partial",
        Paid => "Paid",
    }
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabTemplate {
    pub id: LabTemplateId,
    pub lab_test_name: String,
    pub test_fee: f64,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

impl Record for LabTemplate {
    type Id = LabTemplateId;
    const KIND: &'static str = "Lab Test Template";

    fn id(&self) -> &LabTemplateId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabTest {
    pub id: LabTestId,
    pub patient: PatientId,
    pub patient_name: String,
    pub template: Option<LabTemplateId>,
    pub practitioner: Option<PractitionerId>,
    pub hospital: Option<HospitalId>,
    /// Per tenant and creation day, starting at 1.
    pub queue_number: Option<u32>,
    pub queue_status: LabQueueStatus,
    pub payment_status: Option<PaymentStatus>,
    pub docstatus: DocStatus,
    pub created_at: NaiveDateTime,
    pub modified_at: NaiveDateTime,
}

impl LabTest {
    pub fn created_on(&self, tenant: Option<&HospitalId>, day: NaiveDate) -> bool {
        self.hospital.as_ref() == tenant && self.created_at.date() == day
    }

    /// Queue number, or the tail of the record name before one is assigned.
    pub fn board_number(&self) -> String {
        match self.queue_number {
            Some(number) => number.to_string(),
            None => {
                let name = self.id.as_str();
                let start = name
                    .char_indices()
                    .rev()
                    .nth(4)
                    .map(|(index, _)| index)
                    .unwrap_or(0);
                name[start..].to_string()
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn fixture(id: &str, hospital: Option<&str>) -> Self {
        let created_at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(9, 0, 0))
            .expect("valid timestamp");
        Self {
            id: LabTestId::from(id),
            patient: PatientId::from("PAT-00001"),
            patient_name: "Asha Rao".to_string(),
            template: None,
            practitioner: None,
            hospital: hospital.map(HospitalId::from),
            queue_number: None,
            queue_status: LabQueueStatus::Waiting,
            payment_status: None,
            docstatus: DocStatus::Draft,
            created_at,
            modified_at: created_at,
        }
    }
}

impl Record for LabTest {
    type Id = LabTestId;
    const KIND: &'static str = "Lab Test";

    fn id(&self) -> &LabTestId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabTestRequest {
    pub patient: PatientId,
    #[serde(default)]
    pub template: Option<LabTemplateId>,
    #[serde(default)]
    pub practitioner: Option<PractitionerId>,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabTemplateDraft {
    pub lab_test_name: String,
    #[serde(default)]
    pub test_fee: f64,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabQueueEntry {
    pub name: LabTestId,
    pub patient: PatientId,
    pub patient_name: String,
    pub template: Option<LabTemplateId>,
    pub test_name: String,
    pub queue_number: String,
    pub hospital: Option<HospitalId>,
    pub created_at: NaiveDateTime,
}

/// Laboratory waiting-room board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabQueueBoard {
    pub waiting: Vec<LabQueueEntry>,
    pub collection: Vec<LabQueueEntry>,
    pub processing: Vec<LabQueueEntry>,
    pub current: Option<LabQueueEntry>,
    pub waiting_count: usize,
    pub collection_count: usize,
    pub processing_count: usize,
    pub completed_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueNumber {
    pub queue_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabStatusUpdate {
    pub success: bool,
    pub status: LabQueueStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateCount {
    pub template: Option<LabTemplateId>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: Vec<TemplateCount>,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}
