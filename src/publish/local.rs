//! Filesystem backend for [`RemoteStore`]
//!
//! Layout: `<root>/<folder_id>/<artifact_id>/<file name>`. Folders must exist
//! before artifacts are created in them, mirroring a remote drive.

use super::RemoteStore;
use crate::error::StoreError;
use crate::types::ArtifactId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Artifact store rooted at a local directory
#[derive(Clone, Debug)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a folder so artifacts can be created in it
    pub async fn ensure_folder(&self, folder_id: &str) -> Result<PathBuf, StoreError> {
        let dir = self.root.join(safe_segment(folder_id)?);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Path of the file held by an artifact, if the artifact exists
    pub async fn artifact_path(&self, id: &ArtifactId) -> Result<Option<PathBuf>, StoreError> {
        let token = safe_segment(id.as_str())?;
        let mut folders = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        while let Some(folder) = folders.next_entry().await? {
            if !folder.file_type().await?.is_dir() {
                continue;
            }
            let dir = folder.path().join(token);
            if !tokio::fs::try_exists(&dir).await? {
                continue;
            }
            let mut files = tokio::fs::read_dir(&dir).await?;
            while let Some(file) = files.next_entry().await? {
                if file.file_type().await?.is_file() {
                    return Ok(Some(file.path()));
                }
            }
        }
        Ok(None)
    }
}

/// Reject ids that would escape the store root
fn safe_segment(segment: &str) -> Result<&str, StoreError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\'])
    {
        return Err(StoreError::NotFound(segment.to_string()));
    }
    Ok(segment)
}

#[async_trait]
impl RemoteStore for LocalDirStore {
    async fn create(
        &self,
        local: &Path,
        folder_id: &str,
        name: &str,
    ) -> Result<ArtifactId, StoreError> {
        let folder = self.root.join(safe_segment(folder_id)?);
        if !tokio::fs::try_exists(&folder).await? {
            return Err(StoreError::NotFound(folder_id.to_string()));
        }

        let id = ArtifactId::new(format!("{:016x}", rand::random::<u64>()));
        let dir = folder.join(id.as_str());
        tokio::fs::create_dir(&dir).await?;
        tokio::fs::copy(local, dir.join(safe_segment(name)?)).await?;

        tracing::info!(artifact_id = %id, folder_id, name, "Created local artifact");
        Ok(id)
    }

    async fn update(&self, id: &ArtifactId, local: &Path) -> Result<ArtifactId, StoreError> {
        let target = self
            .artifact_path(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        // Copy beside the target, then swap it in with a rename
        let mut staging = target.clone().into_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);
        tokio::fs::copy(local, &staging).await?;
        tokio::fs::rename(&staging, &target).await?;

        tracing::info!(artifact_id = %id, "Updated local artifact");
        Ok(id.clone())
    }

    async fn exists(&self, id: &ArtifactId) -> Result<bool, StoreError> {
        match self.artifact_path(id).await {
            Ok(path) => Ok(path.is_some()),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn download(&self, id: &ArtifactId, local: &Path) -> Result<(), StoreError> {
        let source = self
            .artifact_path(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        tokio::fs::copy(&source, local).await?;
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (LocalDirStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(dir.path());
        store.ensure_folder("folder").await.unwrap();
        (store, dir)
    }

    fn source(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join(format!("src-{}.csv", contents.len()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn create_then_download_round_trips_contents() {
        let (store, dir) = store().await;
        let file = source(&dir, "a,b\n");
        let id = store.create(&file, "folder", "out.csv").await.unwrap();

        assert!(store.exists(&id).await.unwrap());
        let path = store.artifact_path(&id).await.unwrap().unwrap();
        assert!(path.ends_with(format!("folder/{id}/out.csv")));

        let copy = dir.path().join("copy.csv");
        store.download(&id, &copy).await.unwrap();
        assert_eq!(std::fs::read_to_string(copy).unwrap(), "a,b\n");
    }

    #[tokio::test]
    async fn update_replaces_contents_and_keeps_id() {
        let (store, dir) = store().await;
        let id = store
            .create(&source(&dir, "old\n"), "folder", "out.csv")
            .await
            .unwrap();
        let same = store.update(&id, &source(&dir, "newer\n")).await.unwrap();

        assert_eq!(same, id);
        let path = store.artifact_path(&id).await.unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "newer\n");
    }

    #[tokio::test]
    async fn unknown_ids_do_not_exist() {
        let (store, _dir) = store().await;
        assert!(!store.exists(&ArtifactId::from("missing")).await.unwrap());
        assert!(!store.exists(&ArtifactId::from("../etc")).await.unwrap());
        let err = store
            .update(&ArtifactId::from("missing"), Path::new("/dev/null"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn create_in_missing_folder_is_not_found() {
        let (store, dir) = store().await;
        let err = store
            .create(&source(&dir, "x"), "other", "out.csv")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
