//! CSV payload to raw rows.
//!
//! Headers are matched case-insensitively and every cell is kept as text;
//! typing happens in the normalizer. Rows whose cells are all empty are
//! skipped, which covers the padding a spreadsheet export tends to append.

use csv::{ReaderBuilder, StringRecord, Trim};
use snafu::prelude::*;

use crate::error::{SourceColumnSnafu, SourceCsvSnafu, SourceError};
use crate::record::{RawRow, RawValue};

const YEAR: &[&str] = &["year"];
const MONTH: &[&str] = &["month"];
const DAY: &[&str] = &["day"];
const ID: &[&str] = &["id", "source_id"];
const VALUE: &[&str] = &["value"];

struct Columns {
    year: usize,
    month: usize,
    day: Option<usize>,
    id: usize,
    value: usize,
}

impl Columns {
    fn locate(locator: &str, headers: &StringRecord) -> Result<Self, SourceError> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
        };
        let require = |names: &[&str], column: &str| {
            find(names).context(SourceColumnSnafu { locator, column })
        };

        Ok(Self {
            year: require(YEAR, "Year")?,
            month: require(MONTH, "Month")?,
            day: find(DAY),
            id: require(ID, "ID")?,
            value: require(VALUE, "Value")?,
        })
    }
}

/// Parse a CSV payload fetched from `locator`.
pub fn parse_rows(locator: &str, text: &str) -> Result<Vec<RawRow>, SourceError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers().context(SourceCsvSnafu { locator })?.clone();
    let columns = Columns::locate(locator, &headers)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context(SourceCsvSnafu { locator })?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let cell = |i: usize| RawValue::from(record.get(i).unwrap_or(""));

        rows.push(RawRow {
            year: cell(columns.year),
            month: cell(columns.month),
            day: columns.day.map(cell),
            external_id: record.get(columns.id).unwrap_or("").to_string(),
            value: cell(columns.value),
        });
    }
    Ok(rows)
}
