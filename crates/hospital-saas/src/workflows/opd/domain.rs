use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::ids::{DepartmentId, HospitalId, PatientId, PractitionerId, TokenId};
use crate::sequence::format_identifier;
use crate::store::Record;
use crate::workflows::ServiceError;

labelled_status!(
    /// Lifecycle of an outpatient queue token.
    TokenStatus, "OPD Token" {
        Waiting => "Waiting",
        Called => "Called",
        InQueue => "In Queue",
        WithDoctor => "With Doctor",
        Completed => "Completed",
        Cancelled => "Cancelled",
        NoShow => "No Show",
    }
);

impl TokenStatus {
    /// Still counted when assigning queue positions.
    pub const QUEUED: [Self; 2] = [Self::Waiting, Self::InQueue];
    /// Shown on the waiting-room display.
    pub const ON_DISPLAY: [Self; 4] =
        [Self::Waiting, Self::InQueue, Self::WithDoctor, Self::Called];
    /// Being seen right now.
    pub const CURRENT: [Self; 2] = [Self::WithDoctor, Self::Called];

    pub fn can_transition_to(self, next: Self) -> bool {
        use TokenStatus::*;
        matches!(
            (self, next),
            (Waiting, Called | InQueue | WithDoctor | Cancelled | NoShow)
                | (Called, InQueue | WithDoctor | Waiting | Cancelled | NoShow)
                | (InQueue, Called | WithDoctor | Cancelled | NoShow)
                | (WithDoctor, Completed)
        )
    }

    /// Same status is a no-op; anything off the table is rejected.
    pub fn ensure_transition(self, next: Self) -> Result<(), ServiceError> {
        if self == next || self.can_transition_to(next) {
            Ok(())
        } else {
            Err(ServiceError::IllegalTransition {
                kind: QueueToken::KIND,
                from: self.label(),
                to: next.label(),
            })
        }
    }
}

/// Daily outpatient ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueToken {
    pub id: TokenId,
    pub hospital: Option<HospitalId>,
    pub token_date: NaiveDate,
    /// Per tenant and day, starting at 1.
    pub token_number: u32,
    pub patient: PatientId,
    pub patient_name: String,
    pub mobile: Option<String>,
    pub age: Option<String>,
    pub practitioner: Option<PractitionerId>,
    pub practitioner_name: Option<String>,
    pub department: Option<DepartmentId>,
    /// Snapshot taken at creation; never rebalanced.
    pub queue_position: u32,
    pub status: TokenStatus,
    pub called_at: Option<NaiveDateTime>,
    pub consultation_started: Option<NaiveDateTime>,
    pub consultation_ended: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl QueueToken {
    /// `OPD001`, `OPD002`, ...
    pub fn display_number(&self) -> String {
        format_identifier("OPD", self.token_number, 3)
    }

    pub fn is_on(&self, tenant: Option<&HospitalId>, day: NaiveDate) -> bool {
        self.hospital.as_ref() == tenant && self.token_date == day
    }

    /// Board view without contact details.
    pub fn display_view(&self) -> TokenDisplay {
        TokenDisplay {
            name: self.id.clone(),
            token_number: self.token_number,
            display_number: self.display_number(),
            patient_name: self.patient_name.clone(),
            status: self.status,
            department: self.department.clone(),
            practitioner: self.practitioner.clone(),
            practitioner_name: self
                .practitioner_name
                .clone()
                .or_else(|| self.practitioner.as_ref().map(|id| id.to_string()))
                .unwrap_or_default(),
            queue_position: self.queue_position,
        }
    }

    #[cfg(test)]
    pub(crate) fn fixture(id: &str, hospital: Option<&str>, token_number: u32) -> Self {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        Self {
            id: TokenId::from(id),
            hospital: hospital.map(HospitalId::from),
            token_date: date,
            token_number,
            patient: PatientId::from("PAT-00001"),
            patient_name: "Asha Rao".to_string(),
            mobile: None,
            age: None,
            practitioner: None,
            practitioner_name: None,
            department: None,
            queue_position: token_number,
            status: TokenStatus::Waiting,
            called_at: None,
            consultation_started: None,
            consultation_ended: None,
            created_at: date.and_hms_opt(9, 0, 0).expect("valid time"),
        }
    }
}

impl Record for QueueToken {
    type Id = TokenId;
    const KIND: &'static str = "OPD Token";

    fn id(&self) -> &TokenId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        self.hospital.as_ref()
    }
}

/// Public queue-board row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenDisplay {
    pub name: TokenId,
    pub token_number: u32,
    pub display_number: String,
    pub patient_name: String,
    pub status: TokenStatus,
    pub department: Option<DepartmentId>,
    pub practitioner: Option<PractitionerId>,
    pub practitioner_name: String,
    pub queue_position: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub patient: PatientId,
    #[serde(default)]
    pub practitioner: Option<PractitionerId>,
    #[serde(default)]
    pub department: Option<DepartmentId>,
    #[serde(default)]
    pub hospital: Option<HospitalId>,
    #[serde(default)]
    pub token_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenReceipt {
    pub success: bool,
    pub token_number: u32,
    /// Same value as `token_name`, for clients that read `token_id`.
    pub token_id: TokenId,
    pub token_name: TokenId,
    pub display_number: String,
    pub queue_position: u32,
}

/// Result of calling the next waiting patient.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CallNextOutcome {
    Called {
        success: bool,
        token_number: u32,
        token_name: TokenId,
        patient_name: String,
    },
    Empty {
        success: bool,
        message: String,
    },
}

impl CallNextOutcome {
    pub fn called(token: &QueueToken) -> Self {
        Self::Called {
            success: true,
            token_number: token.token_number,
            token_name: token.id.clone(),
            patient_name: token.patient_name.clone(),
        }
    }

    pub fn empty() -> Self {
        Self::Empty {
            success: false,
            message: "No waiting tokens".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueDisplay {
    pub hospital_name: String,
    pub current: Option<TokenDisplay>,
    pub queue: Vec<TokenDisplay>,
    pub total_waiting: usize,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub success: bool,
    pub status: TokenStatus,
    pub message: String,
}
