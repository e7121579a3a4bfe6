//! Wide-to-long reshaping with fiscal-year date derivation
//!
//! The source table is organized by Thai fiscal year, which starts in October of
//! the previous calendar year. Month columns 10, 11 and 12 of BE year `Y`
//! therefore belong to Common Era year `Y - 543 - 1`, while months 1 to 9 belong
//! to `Y - 543`.

use crate::catalog;
use crate::error::TransformationError;
use crate::partition::BE_OFFSET;
use crate::types::{LongRecord, MONTHS, RawRecord};
use chrono::NaiveDate;

/// First month that belongs to the previous calendar year
const FISCAL_YEAR_START_MONTH: u32 = 10;

/// Calendar date (first of the month) for a BE budget year and a 1-based month column
///
/// Returns `None` when the month is outside `1..=12` or the year is out of range.
pub fn fiscal_month_date(b_year: i32, month: u32) -> Option<NaiveDate> {
    let ce_year = b_year.checked_sub(BE_OFFSET)?;
    let year = if month >= FISCAL_YEAR_START_MONTH {
        ce_year.checked_sub(1)?
    } else {
        ce_year
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Convert wide records into long records
///
/// Emits one row per (record, month) where both target and result are present,
/// month-major: every record's month 1, then every record's month 2, and so on.
/// Pure: the same input always yields the same output.
pub fn reshape(records: &[RawRecord]) -> Result<Vec<LongRecord>, TransformationError> {
    let labels: Vec<Option<&'static str>> = records
        .iter()
        .map(|r| catalog::report_name(&r.report_type_id))
        .collect();

    let mut long = Vec::new();
    for month in 1..=MONTHS {
        for (index, (record, label)) in records.iter().zip(&labels).enumerate() {
            let (Some(target), Some(result)) =
                (record.targets[month - 1], record.results[month - 1])
            else {
                continue;
            };

            let date = fiscal_month_date(record.b_year, month as u32).ok_or_else(|| {
                TransformationError::InvalidValue {
                    row: index,
                    column: crate::schema::B_YEAR_COLUMN.to_string(),
                    value: record.b_year.to_string(),
                }
            })?;

            long.push(LongRecord {
                report_name: label.map(str::to_string),
                facility_code: record.facility_code.clone(),
                area_code: record.area_code.clone(),
                b_year: record.b_year,
                date,
                target,
                result,
            });
        }
    }

    tracing::debug!(raw_rows = records.len(), long_rows = long.len(), "Reshaped");
    Ok(long)
}
