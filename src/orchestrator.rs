//! Concurrent fetch orchestration: bounded fan-out over partitions, single fan-in
//!
//! Every partition is an independent unit of work. Fetches run through a
//! `buffer_unordered` stream capped at the configured concurrency, so results
//! are taken in completion order and a slow partition never blocks the ones
//! behind it. Each fetch owns its result; batches are concatenated once, after
//! every dispatched fetch has settled.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::PartitionFetchError;
use crate::fetch::{FetchOutcome, FlatRow, PartitionSource};
use crate::types::{Event, Partition, PartitionFailure};

/// Aggregate of all partition fetches of a run
#[derive(Clone, Debug, Default)]
pub struct FetchSummary {
    /// Rows of every successful partition; order within a partition is preserved
    pub rows: Vec<FlatRow>,
    /// Number of partitions that were dispatched
    pub dispatched: usize,
    /// Partitions that failed
    pub failures: Vec<PartitionFailure>,
    /// Partitions never dispatched because the run was cancelled
    pub undispatched: Vec<Partition>,
}

impl FetchSummary {
    /// Number of partitions that returned data (possibly zero rows)
    pub fn succeeded(&self) -> usize {
        self.dispatched - self.failures.len()
    }

    /// Whether every dispatched partition failed
    pub fn all_failed(&self) -> bool {
        self.dispatched > 0 && self.failures.len() == self.dispatched
    }

    /// Whether cancellation prevented some partitions from being dispatched
    pub fn was_cancelled(&self) -> bool {
        !self.undispatched.is_empty()
    }
}

/// Dispatches partition fetches over a bounded worker pool
pub struct FetchOrchestrator {
    source: Arc<dyn PartitionSource>,
    concurrency: usize,
    partition_timeout: Duration,
    event_tx: Option<tokio::sync::broadcast::Sender<Event>>,
}

impl FetchOrchestrator {
    /// Create an orchestrator over a partition source
    ///
    /// A concurrency of zero is treated as one.
    pub fn new(
        source: Arc<dyn PartitionSource>,
        concurrency: usize,
        partition_timeout: Duration,
    ) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
            partition_timeout,
            event_tx: None,
        }
    }

    /// Emit per-partition events on the given channel
    pub fn with_events(mut self, event_tx: tokio::sync::broadcast::Sender<Event>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Fetch every partition and merge the results
    ///
    /// Individual failures are recorded, never propagated. After `cancel` fires no
    /// further partition is dispatched; fetches already in flight run to
    /// completion (or to the partition timeout).
    pub async fn fetch_all(
        &self,
        partitions: Vec<Partition>,
        cancel: &CancellationToken,
    ) -> FetchSummary {
        let total = partitions.len();

        let outcomes: Vec<FetchOutcome> = stream::iter(partitions.iter().cloned())
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|partition| {
                let source = Arc::clone(&self.source);
                let ceiling = self.partition_timeout;

                async move {
                    let result =
                        match tokio::time::timeout(ceiling, source.fetch_partition(&partition))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(PartitionFetchError::Timeout {
                                partition: partition.clone(),
                                seconds: ceiling.as_secs(),
                            }),
                        };
                    FetchOutcome::from_result(partition, result)
                }
            })
            .buffer_unordered(self.concurrency)
            .inspect(|outcome| self.report(outcome, total))
            .collect()
            .await;

        // Dispatch is in input order, so whatever was never dispatched is a suffix
        let dispatched = outcomes.len();
        let undispatched = partitions[dispatched..].to_vec();
        if !undispatched.is_empty() {
            tracing::warn!(
                dispatched,
                undispatched = undispatched.len(),
                "Fetch cancelled before all partitions were dispatched"
            );
        }

        let summary = merge(outcomes, undispatched);

        tracing::info!(
            partitions = total,
            succeeded = summary.succeeded(),
            failed = summary.failures.len(),
            rows = summary.rows.len(),
            "Fetch completed"
        );
        self.emit(Event::FetchCompleted {
            succeeded: summary.succeeded(),
            failed: summary.failures.len(),
            rows: summary.rows.len(),
        });

        summary
    }

    fn report(&self, outcome: &FetchOutcome, total: usize) {
        match &outcome.failure {
            None => {
                tracing::debug!(
                    province = %outcome.partition.province_code,
                    year = outcome.partition.year,
                    rows = outcome.batch.len(),
                    total,
                    "Partition fetched"
                );
                self.emit(Event::PartitionFetched {
                    partition: outcome.partition.clone(),
                    rows: outcome.batch.len(),
                });
            }
            Some(failure) => {
                tracing::warn!(
                    province = %failure.partition.province_code,
                    year = failure.partition.year,
                    status = ?failure.status_code,
                    reason = %failure.reason,
                    "Partition failed, continuing with the rest"
                );
                self.emit(Event::PartitionFailed {
                    failure: failure.clone(),
                });
            }
        }
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.event_tx {
            // No subscribers is fine
            tx.send(event).ok();
        }
    }
}

/// Fan-in: concatenate batches and collect failures in one place
fn merge(outcomes: Vec<FetchOutcome>, undispatched: Vec<Partition>) -> FetchSummary {
    let mut summary = FetchSummary {
        dispatched: outcomes.len(),
        undispatched,
        ..Default::default()
    };
    for outcome in outcomes {
        match outcome.failure {
            Some(failure) => summary.failures.push(failure),
            None => summary.rows.extend(outcome.batch.rows),
        }
    }
    summary
}
