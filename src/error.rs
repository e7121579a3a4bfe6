//! Error types for epi-sync
//!
//! This module provides the error taxonomy for a pipeline run:
//! - Partition fetch failures (recorded per partition, never fatal on their own)
//! - Transformation errors (upstream schema drift, always fatal)
//! - Publish and store errors (remote artifact could not be written)
//! - Configuration and run-level policy errors (empty result, cancellation)

use crate::types::{Partition, PartitionFailure};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for epi-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for epi-sync
///
/// Every variant that aborts a run carries enough context to tell which stage
/// failed. Partition-level fetch failures are not part of this enum's fatal path:
/// they are collected into [`PartitionFailure`] records and only surface here
/// through [`Error::EmptyResult`] or [`Error::Cancelled`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "concurrency")
        key: Option<String>,
    },

    /// Every partition failed to fetch, and the policy forbids publishing an empty table
    #[error("all {} partition(s) failed to fetch", failed.len())]
    EmptyResult {
        /// The partitions that failed, with their status codes where known
        failed: Vec<PartitionFailure>,
    },

    /// The run was stopped before every partition was dispatched
    #[error("run cancelled: {} partition(s) never dispatched", undispatched.len())]
    Cancelled {
        /// Partitions that were never sent to the reporting API
        undispatched: Vec<Partition>,
        /// Partitions that were dispatched but failed before cancellation took hold
        failed: Vec<PartitionFailure>,
    },

    /// Raw data did not match the expected wide schema
    #[error("transformation error: {0}")]
    Transformation(#[from] TransformationError),

    /// Publishing the output table failed
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV encoding or decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Build a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Partitions that could not be fetched, if this error carries any
    pub fn failed_partitions(&self) -> &[PartitionFailure] {
        match self {
            Error::EmptyResult { failed } | Error::Cancelled { failed, .. } => failed,
            _ => &[],
        }
    }
}

/// Failure to fetch a single partition from the reporting API
///
/// These errors are recovered locally: the orchestrator records them as
/// [`PartitionFailure`] values and continues with the remaining partitions.
#[derive(Debug, Error)]
pub enum PartitionFetchError {
    /// The API answered with a status outside the accepted set
    #[error("unexpected status {status} for {partition}")]
    Status {
        /// Partition that was requested
        partition: Partition,
        /// HTTP status code returned
        status: u16,
    },

    /// The request never produced a response (timeout, connection refused, ...)
    #[error("transport error for {partition}: {source}")]
    Transport {
        /// Partition that was requested
        partition: Partition,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// The response body was not valid JSON or not a row-shaped document
    #[error("undecodable body for {partition}: {reason}")]
    Body {
        /// Partition that was requested
        partition: Partition,
        /// What was wrong with the body
        reason: String,
    },

    /// The per-partition ceiling elapsed before the fetch settled
    #[error("{partition} did not settle within {seconds}s")]
    Timeout {
        /// Partition that was requested
        partition: Partition,
        /// Ceiling that elapsed, in seconds
        seconds: u64,
    },
}

impl PartitionFetchError {
    /// The partition this failure belongs to
    pub fn partition(&self) -> &Partition {
        match self {
            PartitionFetchError::Status { partition, .. }
            | PartitionFetchError::Transport { partition, .. }
            | PartitionFetchError::Body { partition, .. }
            | PartitionFetchError::Timeout { partition, .. } => partition,
        }
    }

    /// HTTP status code, when the API answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            PartitionFetchError::Status { status, .. } => Some(*status),
            PartitionFetchError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Convert into the structured failure record kept by the orchestrator
    pub fn to_failure(&self) -> PartitionFailure {
        PartitionFailure {
            partition: self.partition().clone(),
            status_code: self.status(),
            reason: self.to_string(),
        }
    }
}

/// Wide rows that do not match the expected report schema
///
/// This always aborts the run: it means the upstream table changed shape and a
/// human needs to look at it before anything is published.
#[derive(Debug, Error)]
pub enum TransformationError {
    /// A required column is absent from a raw row
    #[error("row {row}: missing column `{column}`")]
    MissingColumn {
        /// Zero-based index of the row within its batch
        row: usize,
        /// Column name that was expected
        column: String,
    },

    /// A column holds a value that cannot be coerced to the expected type
    #[error("row {row}: column `{column}` has invalid value {value}")]
    InvalidValue {
        /// Zero-based index of the row within its batch
        row: usize,
        /// Column holding the value
        column: String,
        /// The offending value, rendered as JSON
        value: String,
    },

    /// A wide CSV file is missing one of the required header columns
    #[error("header of {path} is missing column `{column}`")]
    MissingHeader {
        /// File that was being read
        path: PathBuf,
        /// Column name that was expected
        column: String,
    },
}

/// Errors raised while writing the output table to the remote store
#[derive(Debug, Error)]
pub enum PublishError {
    /// Existence check on the prior artifact failed for a reason other than "not found"
    #[error("could not verify artifact {id}: {source}")]
    Verify {
        /// The artifact id being checked
        id: String,
        /// Underlying store failure
        #[source]
        source: StoreError,
    },

    /// In-place update of an existing artifact failed
    #[error("could not update artifact {id}: {source}")]
    Update {
        /// The artifact id being updated
        id: String,
        /// Underlying store failure
        #[source]
        source: StoreError,
    },

    /// Creating a new artifact in the destination folder failed
    #[error("could not create artifact in folder {folder_id}: {source}")]
    Create {
        /// Folder the artifact was created in
        folder_id: String,
        /// Underlying store failure
        #[source]
        source: StoreError,
    },

    /// Fetching a previously published artifact failed
    #[error("could not download artifact {id}: {source}")]
    Download {
        /// The artifact id being fetched
        id: String,
        /// Underlying store failure
        #[source]
        source: StoreError,
    },

    /// Writing the local staging file failed before anything was uploaded
    #[error("could not stage {path}: {reason}")]
    Stage {
        /// Local staging path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },
}

/// Errors reported by a [`RemoteStore`](crate::publish::RemoteStore) backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced artifact or folder does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend rejected the request
    #[error("store returned {status}: {body}")]
    Rejected {
        /// HTTP-like status code returned by the backend
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// The backend could not be reached
    #[error("store unreachable: {0}")]
    Network(#[from] reqwest::Error),

    /// Local file access failed
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend answered with something that could not be understood
    #[error("unexpected store response: {0}")]
    Protocol(String),
}

impl StoreError {
    /// Whether the store confirmed that the target does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
