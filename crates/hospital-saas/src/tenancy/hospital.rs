use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::ids::{HospitalId, PrincipalId};
use crate::store::Record;

/// Free trial window counted from the subscription start.
pub const TRIAL_DAYS: u64 = 14;
/// Licenses closer than this to expiry raise a warning.
pub const LICENSE_WARNING_DAYS: i64 = 30;
/// Subscriptions closer than this to expiry raise a renewal reminder.
pub const SUBSCRIPTION_WARNING_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HospitalStatus {
    Active,
    Inactive,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    /// Status after re-evaluating the subscription window on `today`.
    ///
    /// An ended window is `Expired`. A running window stays `Trial` only while
    /// it is still within the trial days and the hospital was on trial;
    /// otherwise it is `Active`. No window at all means `Trial`.
    pub fn derive(
        current: Self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Self {
        match (start, end) {
            (_, Some(end)) if end < today => Self::Expired,
            (Some(start), Some(_)) => {
                let trial_end = start.checked_add_days(Days::new(TRIAL_DAYS));
                let in_trial = trial_end.is_some_and(|trial_end| today <= trial_end);
                if in_trial && current == Self::Trial {
                    Self::Trial
                } else {
                    Self::Active
                }
            }
            (None, None) => Self::Trial,
            _ => current,
        }
    }
}

/// Public profile links shown on the hospital portal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLinks {
    pub facebook_url: Option<String>,
    pub instagram_url: Option<String>,
    pub youtube_url: Option<String>,
    pub twitter_url: Option<String>,
    pub linkedin_url: Option<String>,
}

impl SocialLinks {
    /// Prefix scheme-less links with `https://`.
    pub fn normalise(&mut self) {
        for url in [
            &mut self.facebook_url,
            &mut self.instagram_url,
            &mut self.youtube_url,
            &mut self.twitter_url,
            &mut self.linkedin_url,
        ] {
            if let Some(value) = url.as_mut() {
                if !value.is_empty()
                    && !value.starts_with("http://")
                    && !value.starts_with("https://")
                {
                    *value = format!("https://{value}");
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Red,
    Orange,
    Yellow,
}

/// Advisory raised while validating a hospital; never blocks the save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HospitalNotice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Tenant record. Every clinical record points back at one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hospital {
    pub id: HospitalId,
    pub business_name: String,
    /// Display copy of the id, filled on first save.
    pub organisation_code: String,
    #[serde(default)]
    pub hospital_code: Option<String>,
    #[serde(default)]
    pub hospital_type: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub helpline: Option<String>,
    #[serde(default)]
    pub address_line_1: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub pincode: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub owner_mobile: Option<String>,
    pub status: HospitalStatus,
    pub subscription_status: SubscriptionStatus,
    #[serde(default)]
    pub subscription_start: Option<NaiveDate>,
    #[serde(default)]
    pub subscription_end: Option<NaiveDate>,
    #[serde(default)]
    pub license_expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub total_beds: Option<u32>,
    #[serde(default)]
    pub icu_beds: u32,
    #[serde(default)]
    pub emergency_beds: u32,
    #[serde(default)]
    pub operation_theaters: u32,
    #[serde(default)]
    pub social: SocialLinks,
    #[serde(default)]
    pub dashboard_footer_text: Option<String>,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub admin_user: Option<PrincipalId>,
    pub created_at: NaiveDateTime,
}

impl Hospital {
    /// Minimal active hospital on trial, mostly for fixtures and demos.
    pub fn named(id: HospitalId, business_name: &str) -> Self {
        Self {
            organisation_code: id.0.clone(),
            id,
            business_name: business_name.to_string(),
            hospital_code: None,
            hospital_type: None,
            email: None,
            phone: None,
            helpline: None,
            address_line_1: None,
            city: None,
            state: None,
            pincode: None,
            owner_name: None,
            owner_email: None,
            owner_mobile: None,
            status: HospitalStatus::Active,
            subscription_status: SubscriptionStatus::Trial,
            subscription_start: None,
            subscription_end: None,
            license_expiry_date: None,
            total_beds: None,
            icu_beds: 0,
            emergency_beds: 0,
            operation_theaters: 0,
            social: SocialLinks::default(),
            dashboard_footer_text: None,
            primary_color: None,
            admin_user: None,
            created_at: NaiveDateTime::default(),
        }
    }

    /// Prefix used in department and pharmacy codes.
    pub fn code_prefix(&self, fallback: &str) -> String {
        self.hospital_code
            .as_deref()
            .filter(|code| !code.trim().is_empty())
            .unwrap_or(fallback)
            .to_string()
    }

    /// Days until the subscription ends; negative once it has lapsed.
    pub fn subscription_days_left(&self, today: NaiveDate) -> Option<i64> {
        self.subscription_end
            .map(|end| end.signed_duration_since(today).num_days())
    }

    /// Derive computed fields and collect advisories. Runs on every save.
    pub fn validate(&mut self, today: NaiveDate) -> Vec<HospitalNotice> {
        let mut notices = Vec::new();

        if let Some(expiry) = self.license_expiry_date {
            let days = expiry.signed_duration_since(today).num_days();
            if days < 0 {
                notices.push(HospitalNotice {
                    level: NoticeLevel::Red,
                    message: "Hospital license has expired!".to_string(),
                });
            } else if days < LICENSE_WARNING_DAYS {
                notices.push(HospitalNotice {
                    level: NoticeLevel::Orange,
                    message: format!("Hospital license will expire in {days} days"),
                });
            }
        }

        self.subscription_status = SubscriptionStatus::derive(
            self.subscription_status,
            self.subscription_start,
            self.subscription_end,
            today,
        );
        self.social.normalise();

        if self.organisation_code.is_empty() {
            self.organisation_code = self.id.0.clone();
        }

        if let Some(days) = self.subscription_days_left(today) {
            if days > 0 && days <= SUBSCRIPTION_WARNING_DAYS {
                notices.push(HospitalNotice {
                    level: NoticeLevel::Orange,
                    message: format!("Subscription will expire in {days} days. Please renew."),
                });
            }
        }

        if self.status == HospitalStatus::Active && self.admin_user.is_none() {
            notices.push(HospitalNotice {
                level: NoticeLevel::Yellow,
                message: "Consider assigning an Admin User for this hospital".to_string(),
            });
        }

        notices
    }
}

impl Record for Hospital {
    type Id = HospitalId;
    const KIND: &'static str = "Hospital";

    fn id(&self) -> &HospitalId {
        &self.id
    }

    fn tenant(&self) -> Option<&HospitalId> {
        Some(&self.id)
    }
}

/// Hospital fields accepted by the onboarding wizard. Anything else in the
/// payload is rejected at deserialisation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HospitalDraft {
    pub business_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub helpline: Option<String>,
    pub address_line_1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
    pub owner_mobile: Option<String>,
    pub hospital_code: Option<String>,
    pub hospital_type: Option<String>,
    pub total_beds: Option<u32>,
    pub icu_beds: Option<u32>,
    pub emergency_beds: Option<u32>,
    pub operation_theaters: Option<u32>,
    pub license_expiry_date: Option<NaiveDate>,
    pub subscription_start: Option<NaiveDate>,
    pub subscription_end: Option<NaiveDate>,
    pub facebook_url: Option<String>,
    pub instagram_url: Option<String>,
    pub youtube_url: Option<String>,
    pub twitter_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub dashboard_footer_text: Option<String>,
    pub primary_color: Option<String>,
}

impl HospitalDraft {
    pub const REQUIRED: [&'static str; 9] = [
        "business_name",
        "email",
        "address_line_1",
        "city",
        "state",
        "pincode",
        "owner_name",
        "owner_email",
        "owner_mobile",
    ];

    fn required_value(&self, field: &str) -> Option<&str> {
        let value = match field {
            "business_name" => &self.business_name,
            "email" => &self.email,
            "address_line_1" => &self.address_line_1,
            "city" => &self.city,
            "state" => &self.state,
            "pincode" => &self.pincode,
            "owner_name" => &self.owner_name,
            "owner_email" => &self.owner_email,
            "owner_mobile" => &self.owner_mobile,
            _ => return None,
        };
        value.as_deref().filter(|value| !value.trim().is_empty())
    }

    /// First required field left empty, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        Self::REQUIRED
            .into_iter()
            .find(|field| self.required_value(field).is_none())
    }

    /// Build an active trial hospital from an already checked draft.
    pub fn into_hospital(self, id: HospitalId, created_at: NaiveDateTime) -> Hospital {
        let mut hospital = Hospital::named(id, self.business_name.as_deref().unwrap_or_default());
        hospital.email = self.email;
        hospital.phone = self.phone;
        hospital.helpline = self.helpline;
        hospital.address_line_1 = self.address_line_1;
        hospital.city = self.city;
        hospital.state = self.state;
        hospital.pincode = self.pincode;
        hospital.owner_name = self.owner_name;
        hospital.owner_email = self.owner_email;
        hospital.owner_mobile = self.owner_mobile;
        hospital.hospital_code = self.hospital_code;
        hospital.hospital_type = self.hospital_type;
        hospital.total_beds = self.total_beds;
        hospital.icu_beds = self.icu_beds.unwrap_or_default();
        hospital.emergency_beds = self.emergency_beds.unwrap_or_default();
        hospital.operation_theaters = self.operation_theaters.unwrap_or_default();
        hospital.license_expiry_date = self.license_expiry_date;
        hospital.subscription_start = self.subscription_start;
        hospital.subscription_end = self.subscription_end;
        hospital.social = SocialLinks {
            facebook_url: self.facebook_url,
            instagram_url: self.instagram_url,
            youtube_url: self.youtube_url,
            twitter_url: self.twitter_url,
            linkedin_url: self.linkedin_url,
        };
        hospital.dashboard_footer_text = self.dashboard_footer_text;
        hospital.primary_color = self.primary_color;
        hospital.status = HospitalStatus::Active;
        hospital.subscription_status = SubscriptionStatus::Trial;
        hospital.created_at = created_at;
        hospital
    }
}

/// Optional administrator account created together with a hospital.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminDraft {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}
