//! Record types flowing through a branch.
//!
//! Raw rows come from a source provider with loosely typed cells. The
//! normalizer turns them into [`CanonicalRecord`]s, which are what the
//! destination stores and what reconciliation compares.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A loosely typed spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Text form of the cell, trimmed. Numbers are rendered without a
    /// trailing `.0` when integral.
    pub fn to_text(&self) -> String {
        match self {
            RawValue::Text(s) => s.trim().to_string(),
            RawValue::Number(n) if n.fract() == 0.0 && n.is_finite() => format!("{}", *n as i64),
            RawValue::Number(n) => n.to_string(),
        }
    }

    /// Returns true for an empty text cell.
    pub fn is_blank(&self) -> bool {
        matches!(self, RawValue::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Number(n) => write!(f, "{n}"),
            RawValue::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl From<i32> for RawValue {
    fn from(n: i32) -> Self {
        RawValue::Number(f64::from(n))
    }
}

/// One row of a spreadsheet-shaped source, built by the source parser from
/// the `Year`, `Month`, optional `Day`, `ID` and `Value` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub year: RawValue,
    pub month: RawValue,
    pub day: Option<RawValue>,
    pub external_id: String,
    pub value: RawValue,
}

impl RawRow {
    /// Build a row without a day column.
    pub fn new(
        year: impl Into<RawValue>,
        month: impl Into<RawValue>,
        external_id: impl Into<String>,
        value: impl Into<RawValue>,
    ) -> Self {
        Self {
            year: year.into(),
            month: month.into(),
            day: None,
            external_id: external_id.into(),
            value: value.into(),
        }
    }

    /// Set the day cell.
    pub fn with_day(mut self, day: impl Into<RawValue>) -> Self {
        self.day = Some(day.into());
        self
    }
}

/// A normalized observation: one value for one source on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Day-granularity timestamp, serialized as `YYYY-MM-DD`.
    pub timestamp: NaiveDate,
    pub value: f64,
    pub source_id: String,
}

impl CanonicalRecord {
    pub fn new(timestamp: NaiveDate, value: f64, source_id: impl Into<String>) -> Self {
        Self {
            timestamp,
            value,
            source_id: source_id.into(),
        }
    }

    /// Identity used for reconciliation. The value is deliberately not part
    /// of it: an existing record wins over a candidate with a different value.
    pub fn key(&self) -> RecordKey<'_> {
        RecordKey {
            timestamp: self.timestamp,
            source_id: &self.source_id,
        }
    }
}

/// Borrowed `(timestamp, source_id)` identity of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey<'a> {
    pub timestamp: NaiveDate,
    pub source_id: &'a str,
}

impl fmt::Display for RecordKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.source_id, self.timestamp.format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_raw_value_text_forms() {
        assert_eq!(RawValue::from(2023).to_text(), "2023");
        assert_eq!(RawValue::from(1.5).to_text(), "1.5");
        assert_eq!(RawValue::from("  Jan ").to_text(), "Jan");
        assert!(RawValue::from("   ").is_blank());
        assert!(!RawValue::from(0.0).is_blank());
    }

    #[test]
    fn test_raw_row_builder() {
        let row = RawRow::new(2023, "Jan", "1.1.01", "10.5");
        assert_eq!(row.year, RawValue::Number(2023.0));
        assert_eq!(row.month, RawValue::Text("Jan".to_string()));
        assert_eq!(row.day, None);
        assert_eq!(row.with_day(15).day, Some(RawValue::Number(15.0)));
    }

    #[test]
    fn test_key_ignores_value() {
        let a = CanonicalRecord::new(date(2023, 1, 1), 10.0, "src");
        let b = CanonicalRecord::new(date(2023, 1, 1), 99.0, "src");
        assert_eq!(a.key(), b.key());
        assert_ne!(a, b);
    }

    #[test]
    fn test_canonical_record_serializes_plain_date() {
        let record = CanonicalRecord::new(date(2023, 1, 1), 10.0, "src1");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"timestamp":"2023-01-01","value":10.0,"source_id":"src1"}"#
        );
    }

    #[test]
    fn test_key_display() {
        let record = CanonicalRecord::new(date(2023, 2, 1), 1.0, "src1");
        assert_eq!(record.key().to_string(), "src1@2023-02-01");
    }
}
