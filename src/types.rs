//! Core types for epi-sync

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Number of monthly columns per measure in the wide layout
pub const MONTHS: usize = 12;

/// One independent fetch unit: a province for a Buddhist Era year
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Partition {
    /// Two-digit province code (e.g. "11")
    pub province_code: String,
    /// Buddhist Era year (e.g. 2567)
    pub year: u32,
}

impl Partition {
    /// Create a new partition
    pub fn new(province_code: impl Into<String>, year: u32) -> Self {
        Self {
            province_code: province_code.into(),
            year,
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "province {} year {}", self.province_code, self.year)
    }
}

/// Structured record of a partition that could not be fetched
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionFailure {
    /// The partition that failed
    pub partition: Partition,
    /// HTTP status code, when the API answered at all
    pub status_code: Option<u16>,
    /// Human-readable description of the failure
    pub reason: String,
}

/// Identifier of a published artifact in a remote store
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub String);

impl ArtifactId {
    /// Create a new artifact id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtifactId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ArtifactId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Where a table is published: a folder plus an optional artifact to overwrite
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Folder new artifacts are created in
    pub folder_id: String,
    /// Artifact to update in place, if one was published before
    #[serde(default)]
    pub existing_artifact_id: Option<ArtifactId>,
    /// File name used when a new artifact is created
    pub file_name: String,
}

/// One wide row from the reporting API, validated against the expected schema
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRecord {
    /// Opaque report-type identifier (the API's `id` column)
    pub report_type_id: String,
    /// Facility code (the API's `hospcode` column)
    pub facility_code: String,
    /// Area code (the API's `areacode` column)
    pub area_code: String,
    /// Buddhist Era budget year
    pub b_year: i32,
    /// Monthly targets, index 0 = month 1
    pub targets: [Option<i64>; MONTHS],
    /// Monthly results, index 0 = month 1
    pub results: [Option<i64>; MONTHS],
}

/// One long row: a single facility-month measurement pair
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LongRecord {
    /// Short report label (`1yr`, `2yr`, ...); absent for unknown report types
    pub report_name: Option<String>,
    /// Facility code
    #[serde(rename = "hospcode")]
    pub facility_code: String,
    /// Area code
    #[serde(rename = "areacode")]
    pub area_code: String,
    /// Buddhist Era budget year
    pub b_year: i32,
    /// First day of the calendar month this measurement belongs to
    pub date: NaiveDate,
    /// Target count for the month
    pub target: i64,
    /// Result count for the month
    pub result: i64,
}

/// Summary of a completed pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// Artifact holding the long table
    pub artifact_id: ArtifactId,
    /// Artifact holding the raw wide table, when raw export is enabled
    pub raw_artifact_id: Option<ArtifactId>,
    /// Number of partitions enumerated for this run
    pub partitions: usize,
    /// Partitions that could not be fetched
    pub failed: Vec<PartitionFailure>,
    /// Number of wide rows fetched
    pub raw_rows: usize,
    /// Number of long rows published
    pub long_rows: usize,
    /// SHA-256 of the published long table, lowercase hex
    pub sha256: String,
}

/// Event emitted during a pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Partitions enumerated, fetching is about to start
    RunStarted {
        /// Number of partitions to fetch
        partitions: usize,
    },

    /// One partition fetched successfully
    PartitionFetched {
        /// The partition
        partition: Partition,
        /// Rows returned
        rows: usize,
    },

    /// One partition failed to fetch (the run continues)
    PartitionFailed {
        /// Failure record
        failure: PartitionFailure,
    },

    /// All dispatched partitions settled
    FetchCompleted {
        /// Partitions that returned data (possibly empty)
        succeeded: usize,
        /// Partitions that failed
        failed: usize,
        /// Total wide rows collected
        rows: usize,
    },

    /// Wide rows converted to long rows
    Reshaped {
        /// Wide rows in
        raw_rows: usize,
        /// Long rows out
        long_rows: usize,
    },

    /// A table was written to the remote store
    Published {
        /// Artifact that now holds the table
        artifact_id: ArtifactId,
        /// Whether an existing artifact was updated in place
        updated: bool,
    },

    /// The run aborted
    RunFailed {
        /// Error message
        error: String,
    },
}
