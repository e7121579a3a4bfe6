//! Test configuration helpers for building pipelines against mock services

use super::fixtures::API_PATH;
use epi_sync::publish::LocalDirStore;
use epi_sync::{Config, Pipeline};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

/// Destination folder every test publishes into
pub const FOLDER: &str = "epi-folder";

/// BE year treated as "now" by the tests
pub const NOW_BE_YEAR: u32 = 2569;

/// BE year fetched in single-year runs
pub const TARGET_YEAR: u32 = 2567;

/// Everything a pipeline test needs, kept alive for the test's duration
pub struct TestHarness {
    /// Pipeline under test
    pub pipeline: Pipeline,
    /// Store the pipeline publishes to
    pub store: LocalDirStore,
    /// Configuration the pipeline was built from
    pub config: Config,
    /// Backing directory for the store and the work dir
    pub temp_dir: TempDir,
}

/// Configuration pointing at the mock API, fetching [`TARGET_YEAR`]
pub fn test_config(server: &MockServer, temp_dir: &TempDir) -> Config {
    let work_dir = temp_dir.path().join("work");
    std::fs::create_dir_all(&work_dir).unwrap();

    let mut config = Config {
        year: Some(TARGET_YEAR),
        concurrency: 8,
        destination_folder_id: FOLDER.to_string(),
        ..Default::default()
    };
    config.api.endpoint = format!("{}{}", server.uri(), API_PATH);
    config.api.request_timeout = Duration::from_secs(5);
    config.api.partition_timeout = Duration::from_secs(10);
    config.output.work_dir = work_dir;
    config
}

/// Build a pipeline from a configuration, publishing to a fresh local store
pub async fn harness_with(config: Config, temp_dir: TempDir) -> TestHarness {
    let store = LocalDirStore::new(temp_dir.path().join("store"));
    store.ensure_folder(FOLDER).await.unwrap();
    let pipeline = Pipeline::from_config(config.clone(), Arc::new(store.clone())).unwrap();

    TestHarness {
        pipeline,
        store,
        config,
        temp_dir,
    }
}

/// Build a pipeline with the default test configuration
pub async fn harness(server: &MockServer) -> TestHarness {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = test_config(server, &temp_dir);
    harness_with(config, temp_dir).await
}

/// Rebuild the pipeline with a modified configuration, keeping the same store
pub fn rebuild(harness: &TestHarness, config: Config) -> Pipeline {
    Pipeline::from_config(config, Arc::new(harness.store.clone())).unwrap()
}
