//! End-to-end run: enumerate, fetch, validate, reshape, publish

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, EmptyResultPolicy};
use crate::error::{Error, Result};
use crate::fetch::{PartitionSource, ReportApiClient};
use crate::orchestrator::FetchOrchestrator;
use crate::partition;
use crate::publish::{Publisher, RemoteStore, csv};
use crate::reshape::reshape;
use crate::schema;
use crate::types::{ArtifactId, Event, RunReport};

/// Capacity of the event channel; slow subscribers lag rather than block the run
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// A configured pipeline
///
/// The pipeline owns the partition source, the publisher and the event channel.
/// Runs are sequential: call [`Pipeline::run`] once per scheduled execution.
/// A cancelled run does not poison the pipeline; the next run gets a fresh token.
pub struct Pipeline {
    config: Arc<Config>,
    source: Arc<dyn PartitionSource>,
    publisher: Publisher,
    event_tx: broadcast::Sender<Event>,
    cancel: Mutex<CancellationToken>,
}

impl Pipeline {
    /// Create a pipeline from its parts
    pub fn new(
        config: Config,
        source: Arc<dyn PartitionSource>,
        store: Arc<dyn RemoteStore>,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let publisher = Publisher::new(store, config.output.work_dir.clone());
        Self {
            config: Arc::new(config),
            source,
            publisher,
            event_tx,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Create a pipeline that fetches from the configured reporting API
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the API endpoint is invalid.
    pub fn from_config(config: Config, store: Arc<dyn RemoteStore>) -> Result<Self> {
        let client = ReportApiClient::new(&config.api, config.retry.clone())?;
        Ok(Self::new(config, Arc::new(client), store))
    }

    /// Subscribe to run events
    ///
    /// Multiple subscribers are supported. Events sent before subscribing are not
    /// replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops dispatching new partitions of the current or next run
    /// when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_slot().clone()
    }

    fn cancel_slot(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install a fresh token once a run has consumed a cancellation
    fn reset_cancelled(&self) {
        let mut slot = self.cancel_slot();
        if slot.is_cancelled() {
            *slot = CancellationToken::new();
        }
    }

    /// The pipeline's configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run against the current Buddhist Era year
    pub async fn run(&self) -> Result<RunReport> {
        self.run_at(partition::current_be_year()).await
    }

    /// Run as if the current Buddhist Era year were `current_be_year`
    ///
    /// Either exactly one long-table artifact is published (plus the raw table
    /// when raw export is enabled), or the run fails with the list of
    /// partitions that could not be fetched, if any.
    pub async fn run_at(&self, current_be_year: u32) -> Result<RunReport> {
        let result = self.execute(current_be_year).await;
        self.reset_cancelled();
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    /// Rebuild the long table from a previously published raw artifact
    pub async fn retransform(&self, raw_artifact_id: &ArtifactId) -> Result<RunReport> {
        let result = self.execute_retransform(raw_artifact_id).await;
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    async fn execute(&self, current_be_year: u32) -> Result<RunReport> {
        let config = &self.config;
        config.validate_at(current_be_year)?;

        let partitions = partition::for_config(config, current_be_year);
        let total = partitions.len();
        tracing::info!(
            mode = ?config.mode,
            partitions = total,
            concurrency = config.concurrency,
            "Starting run"
        );
        self.emit(Event::RunStarted { partitions: total });

        let orchestrator = FetchOrchestrator::new(
            Arc::clone(&self.source),
            config.concurrency,
            config.api.partition_timeout,
        )
        .with_events(self.event_tx.clone());
        let cancel = self.cancel_token();
        let summary = orchestrator.fetch_all(partitions, &cancel).await;

        if summary.was_cancelled() {
            return Err(Error::Cancelled {
                undispatched: summary.undispatched,
                failed: summary.failures,
            });
        }
        if summary.all_failed() {
            match config.empty_result_policy {
                EmptyResultPolicy::Abort => {
                    return Err(Error::EmptyResult {
                        failed: summary.failures,
                    });
                }
                EmptyResultPolicy::PublishEmpty => {
                    tracing::warn!(
                        failed = summary.failures.len(),
                        "Every partition failed, publishing an empty table"
                    );
                }
            }
        }

        let records = schema::parse_rows(&summary.rows)?;
        let long = reshape(&records)?;
        self.emit(Event::Reshaped {
            raw_rows: records.len(),
            long_rows: long.len(),
        });

        let raw_artifact_id = match config.raw_destination() {
            Some(destination) => {
                let published = self.publisher.publish_raw(&summary.rows, &destination).await?;
                self.emit(Event::Published {
                    artifact_id: published.artifact_id.clone(),
                    updated: published.updated,
                });
                Some(published.artifact_id)
            }
            None => None,
        };

        let published = self
            .publisher
            .publish_long(&long, &config.destination())
            .await?;
        self.emit(Event::Published {
            artifact_id: published.artifact_id.clone(),
            updated: published.updated,
        });

        tracing::info!(
            artifact_id = %published.artifact_id,
            raw_rows = records.len(),
            long_rows = long.len(),
            failed = summary.failures.len(),
            "Run completed"
        );
        Ok(RunReport {
            artifact_id: published.artifact_id,
            raw_artifact_id,
            partitions: total,
            failed: summary.failures,
            raw_rows: records.len(),
            long_rows: long.len(),
            sha256: published.sha256,
        })
    }

    async fn execute_retransform(&self, raw_artifact_id: &ArtifactId) -> Result<RunReport> {
        let destination = self.config.destination();
        if destination.folder_id.trim().is_empty() {
            return Err(Error::config(
                "destinationFolderId",
                "a destination folder id is required",
            ));
        }

        tracing::info!(raw_artifact_id = %raw_artifact_id, "Re-transforming raw artifact");
        let staged = self.publisher.fetch(raw_artifact_id).await?;
        let rows = csv::read_raw_file(&staged)?;
        drop(staged);

        let records = schema::parse_rows(&rows)?;
        let long = reshape(&records)?;
        self.emit(Event::Reshaped {
            raw_rows: records.len(),
            long_rows: long.len(),
        });

        let published = self.publisher.publish_long(&long, &destination).await?;
        self.emit(Event::Published {
            artifact_id: published.artifact_id.clone(),
            updated: published.updated,
        });

        Ok(RunReport {
            artifact_id: published.artifact_id,
            raw_artifact_id: Some(raw_artifact_id.clone()),
            partitions: 0,
            failed: Vec::new(),
            raw_rows: records.len(),
            long_rows: long.len(),
            sha256: published.sha256,
        })
    }

    fn fail(&self, error: &Error) {
        let failed = error.failed_partitions();
        tracing::error!(error = %error, failed_partitions = failed.len(), "Run failed");
        for failure in failed {
            tracing::debug!(
                province = %failure.partition.province_code,
                year = failure.partition.year,
                status = ?failure.status_code,
                "Failed partition"
            );
        }
        self.emit(Event::RunFailed {
            error: error.to_string(),
        });
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PartitionFetchError;
    use crate::fetch::{FlatRow, RowBatch};
    use crate::publish::LocalDirStore;
    use crate::types::{MONTHS, Partition};
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    /// Returns one wide row per partition, failing the provinces listed
    struct StubSource {
        failing: Vec<String>,
    }

    fn every_province() -> Vec<String> {
        partition::province_codes()
    }

    fn wide_row(province: &str, year: u32) -> FlatRow {
        let mut row = FlatRow::new();
        row.insert("id".into(), json!("28dd2c7955ce926456240b2ff0100bde"));
        row.insert("hospcode".into(), json!(format!("{province}001")));
        row.insert("areacode".into(), json!(format!("{province}010100")));
        row.insert("b_year".into(), json!(year.to_string()));
        for month in 1..=MONTHS {
            row.insert(schema::target_column(month), json!(10));
            row.insert(schema::result_column(month), json!(month));
        }
        row
    }

    #[async_trait]
    impl PartitionSource for StubSource {
        async fn fetch_partition(
            &self,
            partition: &Partition,
        ) -> std::result::Result<RowBatch, PartitionFetchError> {
            if self.failing.contains(&partition.province_code) {
                return Err(PartitionFetchError::Status {
                    partition: partition.clone(),
                    status: 500,
                });
            }
            Ok(RowBatch::new(vec![wide_row(
                &partition.province_code,
                partition.year,
            )]))
        }
    }

    async fn setup(config: Config, failing: Vec<String>) -> (Pipeline, LocalDirStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(dir.path().join("store"));
        store.ensure_folder("folder").await.unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir(&work).unwrap();

        let mut config = Config {
            destination_folder_id: "folder".to_string(),
            year: Some(2567),
            ..config
        };
        config.output.work_dir = work;

        let pipeline = Pipeline::new(
            config,
            Arc::new(StubSource { failing }),
            Arc::new(store.clone()),
        );
        (pipeline, store, dir)
    }

    #[tokio::test]
    async fn run_publishes_all_provinces() {
        let (pipeline, store, _dir) = setup(Config::default(), vec!["11".into(), "12".into()]).await;
        let report = pipeline.run_at(2569).await.unwrap();

        assert_eq!(report.partitions, 74);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.raw_rows, 72);
        assert_eq!(report.long_rows, 72 * 12);
        assert!(report.raw_artifact_id.is_none());

        let path = store.artifact_path(&report.artifact_id).await.unwrap().unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 72 * 12 + 1);
    }

    #[tokio::test]
    async fn all_failed_aborts_by_default() {
        let (pipeline, _store, _dir) = setup(Config::default(), every_province()).await;
        let mut events = pipeline.subscribe();

        match pipeline.run_at(2569).await {
            Err(Error::EmptyResult { failed }) => assert_eq!(failed.len(), 74),
            other => panic!("expected empty result, got {other:?}"),
        }

        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            if let Event::RunFailed { error } = event {
                assert!(error.contains("74"));
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn all_failed_can_publish_header_only_table() {
        let config = Config {
            empty_result_policy: EmptyResultPolicy::PublishEmpty,
            ..Config::default()
        };
        let (pipeline, store, _dir) = setup(config, every_province()).await;

        let report = pipeline.run_at(2569).await.unwrap();
        assert_eq!(report.long_rows, 0);
        assert_eq!(report.failed.len(), 74);

        let path = store.artifact_path(&report.artifact_id).await.unwrap().unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "report_name,hospcode,areacode,b_year,date,target,result\n"
        );
    }

    #[tokio::test]
    async fn cancelled_run_publishes_nothing() {
        let (pipeline, store, _dir) = setup(Config::default(), Vec::new()).await;
        pipeline.cancel_token().cancel();

        match pipeline.run_at(2569).await {
            Err(Error::Cancelled { undispatched, .. }) => assert_eq!(undispatched.len(), 74),
            other => panic!("expected cancellation, got {other:?}"),
        }
        let folder = store.root().join("folder");
        assert!(std::fs::read_dir(folder).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn pipeline_runs_again_after_cancellation() {
        let (pipeline, store, _dir) = setup(Config::default(), Vec::new()).await;
        let first = pipeline.cancel_token();
        first.cancel();
        assert!(matches!(
            pipeline.run_at(2569).await,
            Err(Error::Cancelled { .. })
        ));

        assert!(!pipeline.cancel_token().is_cancelled());
        let report = pipeline.run_at(2569).await.unwrap();
        assert!(report.failed.is_empty());
        assert!(store.artifact_path(&report.artifact_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalid_config_fails_before_fetching() {
        let (pipeline, _store, _dir) = setup(
            Config {
                concurrency: 0,
                ..Config::default()
            },
            Vec::new(),
        )
        .await;
        assert!(matches!(
            pipeline.run_at(2569).await,
            Err(Error::Config { .. })
        ));
    }

    #[tokio::test]
    async fn raw_export_publishes_second_artifact_that_retransforms() {
        let mut config = Config::default();
        config.output.raw = Some(crate::config::RawExportConfig::default());
        let (pipeline, store, _dir) = setup(config, Vec::new()).await;

        let report = pipeline.run_at(2569).await.unwrap();
        let raw_id = report.raw_artifact_id.clone().unwrap();
        assert_ne!(raw_id, report.artifact_id);

        let again = pipeline.retransform(&raw_id).await.unwrap();
        assert_eq!(again.long_rows, report.long_rows);
        assert_eq!(again.sha256, report.sha256, "same rows, same table");

        let first = std::fs::read_to_string(
            store.artifact_path(&report.artifact_id).await.unwrap().unwrap(),
        )
        .unwrap();
        let second = std::fs::read_to_string(
            store.artifact_path(&again.artifact_id).await.unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(first, second);
    }
}
