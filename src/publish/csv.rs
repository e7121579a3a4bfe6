//! CSV encoding of the long table and the raw wide table

use crate::error::{Error, Result, TransformationError};
use crate::fetch::FlatRow;
use crate::schema;
use crate::types::LongRecord;
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::Path;

/// Column order of the published long table
pub const LONG_HEADER: [&str; 7] = [
    "report_name",
    "hospcode",
    "areacode",
    "b_year",
    "date",
    "target",
    "result",
];

/// Write the long table with its header
///
/// The header is always written, so an empty table is a header-only file.
/// An absent `report_name` becomes an empty field.
pub fn write_long<W: Write>(writer: W, records: &[LongRecord]) -> std::result::Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(LONG_HEADER)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Encode the long table into memory
pub fn long_to_bytes(records: &[LongRecord]) -> std::result::Result<Vec<u8>, csv::Error> {
    let mut buf = Vec::new();
    write_long(&mut buf, records)?;
    Ok(buf)
}

/// Write flat rows as a wide table
///
/// The header is the sorted union of every row's columns. Missing cells and
/// `null` values are empty; nested arrays are written as JSON text. With no rows
/// the header falls back to the required report columns.
pub fn write_raw<W: Write>(writer: W, rows: &[FlatRow]) -> std::result::Result<(), csv::Error> {
    let mut columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();
    let required = schema::required_columns();
    if columns.is_empty() {
        columns = required.iter().map(String::as_str).collect();
    }

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(&columns)?;
    for row in rows {
        wtr.write_record(columns.iter().map(|column| cell(row.get(*column))))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Encode flat rows into memory as a wide table
pub fn raw_to_bytes(rows: &[FlatRow]) -> std::result::Result<Vec<u8>, csv::Error> {
    let mut buf = Vec::new();
    write_raw(&mut buf, rows)?;
    Ok(buf)
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Read a wide table back into flat rows
///
/// Every required report column must be present in the header; `source` names
/// the file in the resulting error. Empty cells become `null`, everything else
/// a string for [`schema::parse_rows`] to coerce.
pub fn read_raw<R: Read>(reader: R, source: &Path) -> Result<Vec<FlatRow>> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = rdr.headers()?.clone();

    for column in schema::required_columns() {
        if !headers.iter().any(|h| h == column) {
            return Err(Error::Transformation(TransformationError::MissingHeader {
                path: source.to_path_buf(),
                column,
            }));
        }
    }

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let row: FlatRow = headers
            .iter()
            .zip(record.iter())
            .map(|(name, value)| {
                let value = if value.is_empty() {
                    Value::Null
                } else {
                    Value::String(value.to_string())
                };
                (name.to_string(), value)
            })
            .collect();
        rows.push(row);
    }

    tracing::debug!(path = %source.display(), rows = rows.len(), "Read wide table");
    Ok(rows)
}

/// Read a wide table from a file
pub fn read_raw_file(path: &Path) -> Result<Vec<FlatRow>> {
    let file = std::fs::File::open(path)?;
    read_raw(std::io::BufReader::new(file), path)
}
