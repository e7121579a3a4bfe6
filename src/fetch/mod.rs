//! Partition fetching from the reporting API
//!
//! The orchestrator only talks to the [`PartitionSource`] trait, which keeps the
//! concurrency and fault-tolerance logic testable without a network:
//!
//! - [`ReportApiClient`]: production source issuing one POST per partition
//! - [`flatten`]: JSON response to flat, dotted-column rows

mod client;
pub mod flatten;

pub use client::ReportApiClient;
pub use flatten::{FlatRow, flatten_response};

use crate::error::PartitionFetchError;
use crate::types::{Partition, PartitionFailure};
use async_trait::async_trait;

/// Rows returned for one partition, in the order the API returned them
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowBatch {
    /// Flattened rows
    pub rows: Vec<FlatRow>,
}

impl RowBatch {
    /// Wrap a list of flat rows
    pub fn new(rows: Vec<FlatRow>) -> Self {
        Self { rows }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Result of fetching one partition: always a batch, plus a failure record when it failed
///
/// A failed partition contributes an empty batch so that aggregation never has
/// to special-case failures.
#[derive(Clone, Debug)]
pub struct FetchOutcome {
    /// The partition that was fetched
    pub partition: Partition,
    /// Rows fetched (empty on failure)
    pub batch: RowBatch,
    /// Failure record, when the fetch failed
    pub failure: Option<PartitionFailure>,
}

impl FetchOutcome {
    /// Convert a fetch result into an outcome
    pub fn from_result(
        partition: Partition,
        result: Result<RowBatch, PartitionFetchError>,
    ) -> Self {
        match result {
            Ok(batch) => Self {
                partition,
                batch,
                failure: None,
            },
            Err(e) => Self {
                partition,
                batch: RowBatch::default(),
                failure: Some(e.to_failure()),
            },
        }
    }
}

/// Source of row batches, one call per partition
///
/// Implementations must be safe to call concurrently for different partitions and
/// must not share mutable state between calls.
#[async_trait]
pub trait PartitionSource: Send + Sync {
    /// Fetch every row of one partition
    async fn fetch_partition(&self, partition: &Partition) -> Result<RowBatch, PartitionFetchError>;
}
