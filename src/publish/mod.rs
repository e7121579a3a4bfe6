//! Publishing tables to a remote artifact store
//!
//! A table is serialized in full to a staging file in the work directory, then
//! uploaded. When a prior artifact id is known it is probed first: a live artifact
//! is updated in place, a confirmed-absent one is replaced by a new artifact in
//! the destination folder. Any other store failure aborts the publish, so a
//! transient error never forks the artifact.

pub mod csv;
mod drive;
mod local;

pub use drive::{DRIVE_API_BASE, DRIVE_REQUEST_TIMEOUT, DRIVE_UPLOAD_BASE, DriveStore};
pub use local::LocalDirStore;

use crate::error::{PublishError, StoreError};
use crate::fetch::FlatRow;
use crate::types::{ArtifactId, Destination, LongRecord};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Capability to store whole-file artifacts in folders
///
/// Implementations must be safe to share across tasks; the publisher itself
/// calls them sequentially.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload `local` as a new artifact named `name` inside `folder_id`
    async fn create(
        &self,
        local: &Path,
        folder_id: &str,
        name: &str,
    ) -> Result<ArtifactId, StoreError>;

    /// Replace the contents of an existing artifact
    async fn update(&self, id: &ArtifactId, local: &Path) -> Result<ArtifactId, StoreError>;

    /// Whether the artifact currently exists
    ///
    /// `Ok(false)` means the store confirmed absence. Errors mean the store could
    /// not tell.
    async fn exists(&self, id: &ArtifactId) -> Result<bool, StoreError>;

    /// Copy an artifact's contents to `local`
    async fn download(&self, id: &ArtifactId, local: &Path) -> Result<(), StoreError>;
}

/// Result of one publish
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Published {
    /// Artifact now holding the table
    pub artifact_id: ArtifactId,
    /// Whether an existing artifact was updated rather than a new one created
    pub updated: bool,
    /// SHA-256 of the uploaded bytes, lowercase hex
    pub sha256: String,
    /// Size of the uploaded file in bytes
    pub bytes: usize,
}

/// Serializes tables and writes them to a [`RemoteStore`]
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn RemoteStore>,
    work_dir: PathBuf,
}

impl Publisher {
    /// Create a publisher staging files under `work_dir`
    pub fn new(store: Arc<dyn RemoteStore>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            work_dir: work_dir.into(),
        }
    }

    /// Publish the long table
    pub async fn publish_long(
        &self,
        records: &[LongRecord],
        destination: &Destination,
    ) -> Result<Published, PublishError> {
        let bytes = csv::long_to_bytes(records).map_err(|e| self.stage_error(e))?;
        self.publish_bytes(&bytes, destination).await
    }

    /// Publish the raw wide table
    pub async fn publish_raw(
        &self,
        rows: &[FlatRow],
        destination: &Destination,
    ) -> Result<Published, PublishError> {
        let bytes = csv::raw_to_bytes(rows).map_err(|e| self.stage_error(e))?;
        self.publish_bytes(&bytes, destination).await
    }

    /// Download an artifact into a staging file in the work directory
    ///
    /// The file is deleted when the returned handle is dropped.
    pub async fn fetch(&self, id: &ArtifactId) -> Result<tempfile::TempPath, PublishError> {
        let staged = self.staging_file()?;
        self.store
            .download(id, &staged)
            .await
            .map_err(|source| PublishError::Download {
                id: id.to_string(),
                source,
            })?;
        Ok(staged)
    }

    async fn publish_bytes(
        &self,
        bytes: &[u8],
        destination: &Destination,
    ) -> Result<Published, PublishError> {
        // Removed on drop, whether or not the upload succeeds
        let staged = self.staging_file()?;
        tokio::fs::write(&staged, bytes)
            .await
            .map_err(|e| self.stage_error(e))?;

        let sha256 = format!("{:x}", Sha256::digest(bytes));
        let (artifact_id, updated) = self.create_or_update(&staged, destination).await?;

        tracing::info!(
            artifact_id = %artifact_id,
            updated,
            bytes = bytes.len(),
            sha256 = %sha256,
            "Published table"
        );
        Ok(Published {
            artifact_id,
            updated,
            sha256,
            bytes: bytes.len(),
        })
    }

    /// Upload a staged file, updating the prior artifact when it still exists
    pub async fn create_or_update(
        &self,
        local: &Path,
        destination: &Destination,
    ) -> Result<(ArtifactId, bool), PublishError> {
        if let Some(id) = &destination.existing_artifact_id {
            let live = match self.store.exists(id).await {
                Ok(live) => live,
                Err(e) if e.is_not_found() => false,
                Err(source) => {
                    tracing::error!(artifact_id = %id, error = %source, "Could not verify artifact");
                    return Err(PublishError::Verify {
                        id: id.to_string(),
                        source,
                    });
                }
            };

            if live {
                let updated = self
                    .store
                    .update(id, local)
                    .await
                    .map_err(|source| PublishError::Update {
                        id: id.to_string(),
                        source,
                    })?;
                return Ok((updated, true));
            }
            tracing::warn!(artifact_id = %id, "Prior artifact no longer exists, creating a new one");
        }

        let created = self
            .store
            .create(local, &destination.folder_id, &destination.file_name)
            .await
            .map_err(|source| PublishError::Create {
                folder_id: destination.folder_id.clone(),
                source,
            })?;
        Ok((created, false))
    }

    fn staging_file(&self) -> Result<tempfile::TempPath, PublishError> {
        tempfile::Builder::new()
            .prefix("epi-sync-")
            .suffix(".csv")
            .tempfile_in(&self.work_dir)
            .map(|file| file.into_temp_path())
            .map_err(|e| self.stage_error(e))
    }

    fn stage_error(&self, e: impl std::fmt::Display) -> PublishError {
        PublishError::Stage {
            path: self.work_dir.clone(),
            reason: e.to_string(),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory store counting calls on each path
    #[derive(Default)]
    struct MemoryStore {
        files: Mutex<HashMap<String, Vec<u8>>>,
        creates: AtomicUsize,
        updates: AtomicUsize,
        fail_exists: bool,
    }

    #[async_trait]
    impl RemoteStore for MemoryStore {
        async fn create(
            &self,
            local: &Path,
            folder_id: &str,
            _name: &str,
        ) -> Result<ArtifactId, StoreError> {
            if folder_id == "missing" {
                return Err(StoreError::NotFound(folder_id.to_string()));
            }
            let n = self.creates.fetch_add(1, Ordering::SeqCst);
            let id = format!("artifact-{n}");
            let bytes = std::fs::read(local)?;
            self.files.lock().unwrap().insert(id.clone(), bytes);
            Ok(ArtifactId::new(id))
        }

        async fn update(&self, id: &ArtifactId, local: &Path) -> Result<ArtifactId, StoreError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            let bytes = std::fs::read(local)?;
            self.files
                .lock()
                .unwrap()
                .insert(id.to_string(), bytes);
            Ok(id.clone())
        }

        async fn exists(&self, id: &ArtifactId) -> Result<bool, StoreError> {
            if self.fail_exists {
                return Err(StoreError::Rejected {
                    status: 503,
                    body: "try again".to_string(),
                });
            }
            Ok(self.files.lock().unwrap().contains_key(id.as_str()))
        }

        async fn download(&self, id: &ArtifactId, local: &Path) -> Result<(), StoreError> {
            let bytes = self
                .files
                .lock()
                .unwrap()
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            std::fs::write(local, bytes)?;
            Ok(())
        }
    }

    fn records() -> Vec<LongRecord> {
        vec![LongRecord {
            report_name: Some("1yr".to_string()),
            facility_code: "10662".to_string(),
            area_code: "50010100".to_string(),
            b_year: 2567,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            target: 10,
            result: 9,
        }]
    }

    fn destination(existing: Option<&str>) -> Destination {
        Destination {
            folder_id: "folder".to_string(),
            existing_artifact_id: existing.map(ArtifactId::from),
            file_name: "out.csv".to_string(),
        }
    }

    fn work_dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn without_prior_id_creates() {
        let store = Arc::new(MemoryStore::default());
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(store.clone(), dir.path());

        let published = publisher
            .publish_long(&records(), &destination(None))
            .await
            .unwrap();

        assert!(!published.updated);
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
        assert_eq!(published.sha256.len(), 64);
        assert!(work_dir_is_empty(dir.path()), "staging file must be removed");
    }

    #[tokio::test]
    async fn publishing_twice_with_same_id_updates_both_times() {
        let store = Arc::new(MemoryStore::default());
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(store.clone(), dir.path());

        let first = publisher
            .publish_long(&records(), &destination(None))
            .await
            .unwrap();
        let prior = first.artifact_id.as_str().to_string();

        for _ in 0..2 {
            let again = publisher
                .publish_long(&records(), &destination(Some(&prior)))
                .await
                .unwrap();
            assert!(again.updated);
            assert_eq!(again.artifact_id, first.artifact_id);
            assert_eq!(again.sha256, first.sha256, "same table, same digest");
        }

        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
        assert_eq!(store.updates.load(Ordering::SeqCst), 2);
        assert_eq!(store.files.lock().unwrap().len(), 1, "exactly one artifact");
    }

    #[tokio::test]
    async fn vanished_prior_artifact_is_recreated() {
        let store = Arc::new(MemoryStore::default());
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(store.clone(), dir.path());

        let published = publisher
            .publish_long(&records(), &destination(Some("deleted-long-ago")))
            .await
            .unwrap();

        assert!(!published.updated);
        assert_eq!(store.updates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transient_exists_failure_is_not_treated_as_absent() {
        let store = Arc::new(MemoryStore {
            fail_exists: true,
            ..Default::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(store.clone(), dir.path());

        let err = publisher
            .publish_long(&records(), &destination(Some("artifact-0")))
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Verify { .. }));
        assert_eq!(store.creates.load(Ordering::SeqCst), 0, "must not fork the artifact");
        assert!(work_dir_is_empty(dir.path()), "staging file must be removed on failure");
    }

    #[tokio::test]
    async fn create_failure_names_folder() {
        let store = Arc::new(MemoryStore::default());
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(store, dir.path());
        let dest = Destination {
            folder_id: "missing".to_string(),
            ..destination(None)
        };

        match publisher.publish_long(&records(), &dest).await {
            Err(PublishError::Create { folder_id, source }) => {
                assert_eq!(folder_id, "missing");
                assert!(source.is_not_found());
            }
            other => panic!("expected create error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_work_dir_is_stage_error() {
        let store = Arc::new(MemoryStore::default());
        let publisher = Publisher::new(store, "/nonexistent/epi-sync/work");
        let err = publisher
            .publish_long(&records(), &destination(None))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Stage { .. }));
    }

    #[tokio::test]
    async fn fetch_stages_downloaded_artifact() {
        let store = Arc::new(MemoryStore::default());
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(store.clone(), dir.path());
        let published = publisher
            .publish_long(&records(), &destination(None))
            .await
            .unwrap();

        let staged = publisher.fetch(&published.artifact_id).await.unwrap();
        let text = std::fs::read_to_string(&staged).unwrap();
        assert!(text.starts_with("report_name,hospcode"));
        drop(staged);
        assert!(work_dir_is_empty(dir.path()));

        let err = publisher.fetch(&ArtifactId::from("nope")).await.unwrap_err();
        assert!(matches!(err, PublishError::Download { .. }));
    }
}
