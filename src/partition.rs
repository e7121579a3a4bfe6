//! Partition enumeration: which (province, year) units a run fetches

use crate::config::{Config, RunMode};
use crate::types::Partition;
use chrono::Datelike;

/// Offset between Buddhist Era and Common Era years
pub const BE_OFFSET: i32 = 543;

/// First BE year fetched in historical mode
pub const HISTORICAL_START_YEAR: u32 = 2557;

/// Lowest and highest two-digit province codes considered
const PROVINCE_RANGE: std::ops::RangeInclusive<u32> = 11..=96;

/// Codes in the administrative range that never report (Bangkok and unassigned codes)
pub const EXCLUDED_PROVINCES: [u32; 11] = [10, 28, 29, 59, 68, 69, 78, 79, 87, 88, 89];

/// All reporting province codes, ascending, formatted as two digits
pub fn province_codes() -> Vec<String> {
    PROVINCE_RANGE
        .filter(|code| !EXCLUDED_PROVINCES.contains(code))
        .map(|code| format!("{code:02}"))
        .collect()
}

/// Current Buddhist Era year from the local clock
pub fn current_be_year() -> u32 {
    be_year_of(chrono::Local::now().date_naive())
}

/// Buddhist Era year of a calendar date
pub fn be_year_of(date: chrono::NaiveDate) -> u32 {
    (date.year() + BE_OFFSET).max(0) as u32
}

/// Enumerate the partitions a run fetches
///
/// Single-year mode yields one partition per province for `year` (or the current
/// BE year). Historical mode yields the cross product of provinces and years in
/// `[start_year, current_be_year)`, year-major.
pub fn enumerate(
    mode: RunMode,
    year: Option<u32>,
    start_year: u32,
    current_be_year: u32,
) -> Vec<Partition> {
    let provinces = province_codes();
    match mode {
        RunMode::SingleYear => {
            let year = year.unwrap_or(current_be_year);
            provinces
                .into_iter()
                .map(|code| Partition::new(code, year))
                .collect()
        }
        RunMode::Historical => (start_year..current_be_year)
            .flat_map(|year| {
                provinces
                    .iter()
                    .map(move |code| Partition::new(code.clone(), year))
            })
            .collect(),
    }
}

/// Enumerate the partitions described by a configuration
pub fn for_config(config: &Config, current_be_year: u32) -> Vec<Partition> {
    enumerate(config.mode, config.year, config.start_year, current_be_year)
}
