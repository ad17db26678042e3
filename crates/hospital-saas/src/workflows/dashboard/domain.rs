use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::ids::HospitalId;
use crate::tenancy::{HospitalStatus, SubscriptionStatus};

/// Subscriptions ending within this many days raise an alert.
pub const SUBSCRIPTION_ALERT_DAYS: i64 = 7;

/// Default length of the recent-activity feed.
pub const RECENT_ACTIVITY_LIMIT: usize = 20;

/// Rows taken from each source before the activity feed is merged.
pub(crate) const ACTIVITY_PER_SOURCE: usize = 5;

/// Headline numbers for the caller's hospital.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_patients: usize,
    pub todays_appointments: usize,
    pub active_tokens: usize,
    pub todays_revenue: f64,
    pub active_ipd: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HospitalHeader {
    pub name: HospitalId,
    pub business_name: String,
    pub organisation_code: String,
    pub subscription_status: SubscriptionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientFigures {
    pub total: usize,
    pub new_today: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppointmentFigures {
    pub today: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpdFigures {
    pub waiting: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabFigures {
    pub pending: usize,
    pub completed_today: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadiologyFigures {
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IpdFigures {
    pub admitted: usize,
    /// Negative when occupancy exceeds the recorded bed count.
    pub available_beds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueFigures {
    pub today: f64,
    pub month: f64,
    pub outstanding: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaffFigures {
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HospitalDashboard {
    pub hospital: HospitalHeader,
    pub patients: PatientFigures,
    pub appointments: AppointmentFigures,
    pub opd: OpdFigures,
    pub lab: LabFigures,
    pub radiology: RadiologyFigures,
    pub ipd: IpdFigures,
    pub revenue: RevenueFigures,
    pub staff: StaffFigures,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HospitalOverview {
    pub name: HospitalId,
    pub organisation_code: String,
    pub business_name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub hospital_type: Option<String>,
    pub status: HospitalStatus,
    pub subscription_status: SubscriptionStatus,
    pub subscription_end: Option<NaiveDate>,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
    pub total_beds: Option<u32>,
    pub patient_count: usize,
    pub staff_count: usize,
    pub today_appointments: usize,
    pub today_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformSummary {
    pub total_hospitals: usize,
    pub active_hospitals: usize,
    pub total_patients: usize,
    pub total_staff: usize,
    pub today_revenue: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl AlertLevel {
    /// `None` while the subscription has more than a week left.
    pub fn for_days_left(days_left: i64) -> Option<Self> {
        if days_left <= 0 {
            Some(Self::Critical)
        } else if days_left <= SUBSCRIPTION_ALERT_DAYS {
            Some(Self::Warning)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionAlert {
    pub hospital: HospitalId,
    pub business_name: String,
    pub days_left: i64,
    pub status: AlertLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuperAdminDashboard {
    pub hospitals: Vec<HospitalOverview>,
    pub summary: PlatformSummary,
    pub subscription_alerts: Vec<SubscriptionAlert>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevenuePeriod {
    Week,
    #[default]
    Month,
    Year,
}

impl RevenuePeriod {
    pub fn lookback_days(self) -> i64 {
        match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Year => 365,
        }
    }

    /// Bucket label for a posting date: per day, or per month for a year.
    pub fn bucket(self, date: NaiveDate) -> String {
        match self {
            Self::Week | Self::Month => date.format("%Y-%m-%d").to_string(),
            Self::Year => date.format("%Y-%m").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RevenueChart {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub counts: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Patient,
    Appointment,
    Invoice,
}

impl ActivityKind {
    pub fn icon(self) -> &'static str {
        match self {
            Self::Patient => "user",
            Self::Appointment => "calendar",
            Self::Invoice => "file-text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub icon: &'static str,
    pub message: String,
    pub time: NaiveDateTime,
    pub hospital: Option<HospitalId>,
}

impl Activity {
    pub fn new(
        kind: ActivityKind,
        message: String,
        time: NaiveDateTime,
        hospital: Option<HospitalId>,
    ) -> Self {
        Self {
            kind,
            icon: kind.icon(),
            message,
            time,
            hospital,
        }
    }
}
