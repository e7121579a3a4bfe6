//! Wide-row schema: validation of flat rows into [`RawRecord`]s
//!
//! The reporting API returns loosely typed JSON. Before anything is reshaped,
//! every row is checked against the columns the `s_epi_complete` table is
//! expected to carry. A missing column or a value that cannot be read as an
//! integer aborts the run with a [`TransformationError`].

use crate::error::TransformationError;
use crate::fetch::FlatRow;
use crate::types::{MONTHS, RawRecord};
use serde_json::Value;

/// Column holding the report-type id
pub const REPORT_TYPE_COLUMN: &str = "id";
/// Column holding the facility code
pub const FACILITY_COLUMN: &str = "hospcode";
/// Column holding the area code
pub const AREA_COLUMN: &str = "areacode";
/// Column holding the BE budget year
pub const B_YEAR_COLUMN: &str = "b_year";

/// Name of the target column for a month (1-based)
pub fn target_column(month: usize) -> String {
    format!("target{month:02}")
}

/// Name of the result column for a month (1-based)
pub fn result_column(month: usize) -> String {
    format!("result{month:02}")
}

/// Every column a wide row must carry
pub fn required_columns() -> Vec<String> {
    let mut columns = vec![
        REPORT_TYPE_COLUMN.to_string(),
        FACILITY_COLUMN.to_string(),
        AREA_COLUMN.to_string(),
        B_YEAR_COLUMN.to_string(),
    ];
    columns.extend((1..=MONTHS).map(target_column));
    columns.extend((1..=MONTHS).map(result_column));
    columns
}

/// Validate a batch of flat rows
///
/// Fails on the first row that does not match the schema.
pub fn parse_rows(rows: &[FlatRow]) -> Result<Vec<RawRecord>, TransformationError> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| parse_row(index, row))
        .collect()
}

/// Validate one flat row
pub fn parse_row(index: usize, row: &FlatRow) -> Result<RawRecord, TransformationError> {
    let mut targets = [None; MONTHS];
    let mut results = [None; MONTHS];
    for month in 1..=MONTHS {
        targets[month - 1] = nullable_int(index, row, &target_column(month))?;
        results[month - 1] = nullable_int(index, row, &result_column(month))?;
    }

    let b_year = required_int(index, row, B_YEAR_COLUMN)?;
    let b_year =
        i32::try_from(b_year).map_err(|_| invalid(index, B_YEAR_COLUMN, &b_year.into()))?;

    Ok(RawRecord {
        report_type_id: text(index, row, REPORT_TYPE_COLUMN)?,
        facility_code: text(index, row, FACILITY_COLUMN)?,
        area_code: text(index, row, AREA_COLUMN)?,
        b_year,
        targets,
        results,
    })
}

fn column<'a>(
    index: usize,
    row: &'a FlatRow,
    name: &str,
) -> Result<&'a Value, TransformationError> {
    row.get(name).ok_or_else(|| TransformationError::MissingColumn {
        row: index,
        column: name.to_string(),
    })
}

fn text(index: usize, row: &FlatRow, name: &str) -> Result<String, TransformationError> {
    match column(index, row, name)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(invalid(index, name, other)),
    }
}

fn required_int(index: usize, row: &FlatRow, name: &str) -> Result<i64, TransformationError> {
    let value = column(index, row, name)?;
    coerce_int(value)
        .map_err(|NotAnInteger| invalid(index, name, value))?
        .ok_or_else(|| invalid(index, name, value))
}

fn nullable_int(
    index: usize,
    row: &FlatRow,
    name: &str,
) -> Result<Option<i64>, TransformationError> {
    let value = column(index, row, name)?;
    coerce_int(value).map_err(|NotAnInteger| invalid(index, name, value))
}

/// A cell that holds something other than an integer or null
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NotAnInteger;

/// Read a JSON value as a nullable integer
///
/// Accepts integers, integral floats, and decimal strings; `null` and blank
/// strings are null. Anything else is an error.
pub(crate) fn coerce_int(value: &Value) -> Result<Option<i64>, NotAnInteger> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Some(i)),
            None => n.as_f64().and_then(integral).map(Some).ok_or(NotAnInteger),
        },
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Some(i));
            }
            s.parse::<f64>()
                .ok()
                .and_then(integral)
                .map(Some)
                .ok_or(NotAnInteger)
        }
        _ => Err(NotAnInteger),
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn invalid(index: usize, name: &str, value: &Value) -> TransformationError {
    TransformationError::InvalidValue {
        row: index,
        column: name.to_string(),
        value: value.to_string(),
    }
}
