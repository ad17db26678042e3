//! Per-tenant, per-period counters behind human-readable identifiers such as
//! `OPD003` or `IPD012`.
//!
//! The counter for a key is seeded from the number of rows that already exist
//! for it, then advanced with an atomic increment-and-fetch, so two concurrent
//! creations never observe the same value.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::ids::HospitalId;
use crate::store::RepositoryError;

/// Which family of identifiers a counter belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Series {
    OpdToken,
    LabQueue,
    IpdAdmission,
    /// Document names (`TKN-00001`, `SINV-00001`, ...) keyed by the record kind.
    Document(&'static str),
    /// Department codes keyed by `{hospital_code}-{prefix}`.
    DepartmentCode(String),
    PharmacyCode,
}

/// Window over which a counter restarts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencePeriod {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
    Lifetime,
}

impl SequencePeriod {
    pub fn month_of(date: NaiveDate) -> Self {
        Self::Month {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match *self {
            Self::Day(day) => day == date,
            Self::Month { year, month } => date.year() == year && date.month() == month,
            Self::Lifetime => true,
        }
    }
}

/// Full counter key. A record without a tenant counts in the `None` bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SequenceKey {
    pub series: Series,
    pub tenant: Option<HospitalId>,
    pub period: SequencePeriod,
}

impl SequenceKey {
    pub fn new(series: Series, tenant: Option<HospitalId>, period: SequencePeriod) -> Self {
        Self {
            series,
            tenant,
            period,
        }
    }

    pub fn document(kind: &'static str) -> Self {
        Self::new(Series::Document(kind), None, SequencePeriod::Lifetime)
    }
}

/// Storage seam handing out the next value of a counter.
pub trait SequenceCounter: Send + Sync {
    /// Returns the next value for `key`. `seed` reports how many rows already
    /// exist for the key and is consulted only the first time the key is seen.
    fn next_value(
        &self,
        key: &SequenceKey,
        seed: &dyn Fn() -> Result<u32, RepositoryError>,
    ) -> Result<u32, RepositoryError>;
}

/// `prefix` followed by `value` zero-padded to `width` digits.
pub fn format_identifier(prefix: &str, value: u32, width: usize) -> String {
    format!("{prefix}{value:0width$}")
}

/// Next value of a bare count-then-add series.
pub fn next_after(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX - 1) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_zero_padded_suffix() {
        assert_eq!(format_identifier("OPD", 3, 3), "OPD003");
        assert_eq!(format_identifier("IPD", 12, 3), "IPD012");
        assert_eq!(format_identifier("H", 1, 5), "H00001");
        assert_eq!(format_identifier("OPD", 1234, 3), "OPD1234");
    }

    #[test]
    fn first_value_of_empty_period_is_one() {
        assert_eq!(next_after(0), 1);
        assert_eq!(format_identifier("OPD", next_after(0), 3), "OPD001");
    }

    #[test]
    fn month_period_contains_only_its_days() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date");
        let period = SequencePeriod::month_of(date);
        assert!(period.contains(NaiveDate::from_ymd_opt(2024, 2, 1).expect("valid date")));
        assert!(!period.contains(NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date")));
        assert!(!period.contains(NaiveDate::from_ymd_opt(2023, 2, 1).expect("valid date")));
    }
}
