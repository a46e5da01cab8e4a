//! Row normalization and source filtering.
//!
//! Both functions are pure and keep the relative order of their input. A row
//! that cannot be normalized is reported and skipped; it never aborts the
//! rest of the batch.

use chrono::NaiveDate;
use tracing::warn;

use crate::error::RowError;
use crate::error::RowErrorKind;
use crate::record::{CanonicalRecord, RawRow, RawValue};

/// Day used when a row carries only a year and a month.
pub const DEFAULT_DAY: u32 = 1;

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Output of [`normalize`]: the canonical records plus every dropped row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub records: Vec<CanonicalRecord>,
    pub dropped: Vec<RowError>,
}

/// Convert raw rows into canonical records.
pub fn normalize(rows: &[RawRow]) -> Normalized {
    let mut out = Normalized {
        records: Vec::with_capacity(rows.len()),
        dropped: Vec::new(),
    };

    for (index, row) in rows.iter().enumerate() {
        match normalize_row(row) {
            Ok(record) => out.records.push(record),
            Err(kind) => {
                let err = RowError {
                    row: index,
                    external_id: row.external_id.clone(),
                    kind,
                };
                warn!(row = index, source_id = %row.external_id, error = %err.kind, "Dropping row");
                out.dropped.push(err);
            }
        }
    }

    out
}

/// Keep only the records belonging to `source_id`.
pub fn filter_by_source_id(records: &[CanonicalRecord], source_id: &str) -> Vec<CanonicalRecord> {
    records
        .iter()
        .filter(|record| record.source_id == source_id)
        .cloned()
        .collect()
}

/// Normalize a single row.
pub fn normalize_row(row: &RawRow) -> Result<CanonicalRecord, RowErrorKind> {
    let year = parse_year(&row.year)?;
    let month = parse_month(&row.month)?;
    let day = parse_day(row.day.as_ref())?;
    let timestamp = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or(RowErrorKind::InvalidDate { year, month, day })?;
    let value = parse_value(&row.value)?;

    Ok(CanonicalRecord::new(timestamp, value, row.external_id.clone()))
}

/// Integral number from a cell, accepting `"2023"` as well as `"2023.0"`.
fn integral(cell: &RawValue) -> Option<i64> {
    let n = match cell {
        RawValue::Number(n) => *n,
        RawValue::Text(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Some(i);
            }
            s.parse::<f64>().ok()?
        }
    };
    (n.is_finite() && n.fract() == 0.0).then_some(n as i64)
}

fn parse_year(cell: &RawValue) -> Result<i32, RowErrorKind> {
    integral(cell)
        .filter(|y| (1..=9999).contains(y))
        .and_then(|y| i32::try_from(y).ok())
        .ok_or_else(|| RowErrorKind::InvalidYear { raw: cell.to_text() })
}

fn parse_month(cell: &RawValue) -> Result<u32, RowErrorKind> {
    let invalid = || RowErrorKind::InvalidMonth { raw: cell.to_text() };

    if let Some(n) = integral(cell) {
        return u32::try_from(n)
            .ok()
            .filter(|m| (1..=12).contains(m))
            .ok_or_else(invalid);
    }

    let name = cell.to_text().to_lowercase();
    if name.len() < 3 {
        return Err(invalid());
    }
    MONTH_NAMES
        .iter()
        .position(|full| *full == name || (name.len() == 3 && full.starts_with(&name)))
        .map(|idx| idx as u32 + 1)
        .ok_or_else(invalid)
}

fn parse_day(cell: Option<&RawValue>) -> Result<u32, RowErrorKind> {
    let Some(cell) = cell.filter(|c| !c.is_blank()) else {
        return Ok(DEFAULT_DAY);
    };
    integral(cell)
        .and_then(|d| u32::try_from(d).ok())
        .filter(|d| (1..=31).contains(d))
        .ok_or_else(|| RowErrorKind::InvalidDay { raw: cell.to_text() })
}

fn parse_value(cell: &RawValue) -> Result<f64, RowErrorKind> {
    let value = match cell {
        RawValue::Number(n) => *n,
        RawValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| RowErrorKind::InvalidValue { raw: s.clone() })?,
    };
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RowErrorKind::NonFiniteValue { value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_day_is_first_of_month() {
        let row = RawRow::new(2023, "Jan", "src1", 10);
        let record = normalize_row(&row).unwrap();
        assert_eq!(record, CanonicalRecord::new(date(2023, 1, 1), 10.0, "src1"));
    }

    #[test]
    fn test_month_forms() {
        for (cell, expected) in [
            (RawValue::from("Jan"), 1),
            (RawValue::from("february"), 2),
            (RawValue::from("SEP"), 9),
            (RawValue::from("12"), 12),
            (RawValue::from(7), 7),
            (RawValue::from(" Oct "), 10),
        ] {
            assert_eq!(parse_month(&cell), Ok(expected), "month cell {cell}");
        }
        assert!(parse_month(&RawValue::from("13")).is_err());
        assert!(parse_month(&RawValue::from("Ja")).is_err());
        assert!(parse_month(&RawValue::from("Janu")).is_err());
        assert!(parse_month(&RawValue::from("")).is_err());
    }

    #[test]
    fn test_explicit_day() {
        let row = RawRow::new("2024", "2", "a", "1.5").with_day(29);
        assert_eq!(normalize_row(&row).unwrap().timestamp, date(2024, 2, 29));

        let blank = RawRow::new(2024, 2, "a", 1).with_day("");
        assert_eq!(normalize_row(&blank).unwrap().timestamp, date(2024, 2, 1));

        let bad = RawRow::new(2023, 2, "a", 1).with_day(29);
        assert_eq!(
            normalize_row(&bad),
            Err(RowErrorKind::InvalidDate {
                year: 2023,
                month: 2,
                day: 29
            })
        );
    }

    #[test]
    fn test_values() {
        assert_eq!(parse_value(&RawValue::from(" 3.25 ")), Ok(3.25));
        assert_eq!(parse_value(&RawValue::from(-4)), Ok(-4.0));
        assert!(matches!(
            parse_value(&RawValue::from("n/a")),
            Err(RowErrorKind::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_value(&RawValue::from("inf")),
            Err(RowErrorKind::NonFiniteValue { .. })
        ));
        assert!(matches!(
            parse_value(&RawValue::Number(f64::NAN)),
            Err(RowErrorKind::NonFiniteValue { .. })
        ));
    }

    #[test]
    fn test_year_rejects_fractional_and_garbage() {
        assert_eq!(parse_year(&RawValue::from("2023.0")), Ok(2023));
        assert!(parse_year(&RawValue::from(2023.5)).is_err());
        assert!(parse_year(&RawValue::from("twenty")).is_err());
        assert!(parse_year(&RawValue::from(0)).is_err());
    }

    #[test]
    fn test_bad_row_is_dropped_and_rest_kept_in_order() {
        let rows = vec![
            RawRow::new(2023, "Jan", "src1", 10),
            RawRow::new(2023, "Feb", "src1", "not a number"),
            RawRow::new(2023, "Mar", "src1", 30),
            RawRow::new(2023, "Apr", "src2", 40),
        ];

        let out = normalize(&rows);
        let months: Vec<_> = out.records.iter().map(|r| r.timestamp).collect();
        assert_eq!(months, vec![date(2023, 1, 1), date(2023, 3, 1), date(2023, 4, 1)]);

        assert_eq!(out.dropped.len(), 1);
        assert_eq!(out.dropped[0].row, 1);
        assert_eq!(out.dropped[0].external_id, "src1");
        assert!(matches!(out.dropped[0].kind, RowErrorKind::InvalidValue { .. }));
    }

    #[test]
    fn test_filter_keeps_order_and_exact_matches() {
        let records = vec![
            CanonicalRecord::new(date(2023, 1, 1), 1.0, "a"),
            CanonicalRecord::new(date(2023, 1, 1), 2.0, "b"),
            CanonicalRecord::new(date(2023, 2, 1), 3.0, "a"),
            CanonicalRecord::new(date(2023, 3, 1), 4.0, "a.1"),
        ];

        let filtered = filter_by_source_id(&records, "a");
        let values: Vec<_> = filtered.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![1.0, 3.0]);
        assert!(filter_by_source_id(&records, "missing").is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize(&[]), Normalized::default());
    }
}
