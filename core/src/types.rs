//! Shared primitive types used across the pipeline.

use crate::error::{EtlError, EtlResult};
use chrono::{Datelike, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Surrogate id of a row in the job ledger.
pub type JobId = i64;

/// Surrogate id of any persisted dimension or transaction row.
pub type RowId = i64;

/// Storage format for dates (`day` columns).
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Storage format for audit timestamps. Millisecond precision, UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Current UTC time rendered with [`TIMESTAMP_FORMAT`].
pub fn timestamp_now() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// A calendar month, the unit a run reconciles transactions for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> EtlResult<Self> {
        if !(1..=12).contains(&month) || NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(EtlError::InvalidMonth(format!("{year:04}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    /// The month containing today's local date.
    pub fn current() -> Self {
        let today = Local::now().date_naive();
        Self {
            year: today.year(),
            month: today.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        // Month::new guarantees day 1 exists.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    /// Build a date in this month from a two-digit day-of-month field.
    /// Returns `None` for anything that is not exactly two ASCII digits
    /// naming a day that exists in this month.
    pub fn day(&self, field: &str) -> Option<NaiveDate> {
        let field = field.trim();
        if field.len() != 2 || !field.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let day: u32 = field.parse().ok()?;
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EtlError::InvalidMonth(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Month::new(year, month).map_err(|_| invalid())
    }
}

impl Serialize for Month {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_year_month() {
        let m: Month = "2024-02".parse().unwrap();
        assert_eq!(m.year(), 2024);
        assert_eq!(m.month(), 2);
        assert_eq!(m.to_string(), "2024-02");
    }

    #[test]
    fn rejects_malformed_months() {
        for bad in ["2024-13", "2024-00", "24-02", "2024-2", "2024/02", "", "abcd-ef"] {
            assert!(bad.parse::<Month>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn builds_days_from_two_digit_fields() {
        let feb: Month = "2024-02".parse().unwrap();
        assert_eq!(feb.day("07"), NaiveDate::from_ymd_opt(2024, 2, 7));
        assert_eq!(feb.day("29"), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(feb.day("30"), None);
        assert_eq!(feb.day("7"), None);
        assert_eq!(feb.day("007"), None);
        assert_eq!(feb.day("00"), None);
        assert_eq!(feb.day("x1"), None);
        assert_eq!(feb.day(""), None);
    }

    #[test]
    fn month_bounds() {
        let dec: Month = "2023-12".parse().unwrap();
        assert_eq!(dec.first_day(), NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
        assert_eq!(dec.last_day(), NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert!(dec.contains(NaiveDate::from_ymd_opt(2023, 12, 15).unwrap()));
        assert!(!dec.contains(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));

        let feb: Month = "2023-02".parse().unwrap();
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
    }
}
