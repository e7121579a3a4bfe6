//! Google Drive v3 backend for [`RemoteStore`]
//!
//! Authentication is out of scope here: the caller injects a bearer token that
//! already carries the `drive.file` scope.

use super::RemoteStore;
use crate::error::StoreError;
use crate::types::ArtifactId;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default metadata endpoint
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3/";
/// Default upload endpoint
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3/";

/// Default ceiling on a single Drive request, upload and download included
pub const DRIVE_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const CSV_MIME: &str = "text/csv";

#[derive(Deserialize)]
struct FileResource {
    id: Option<String>,
}

/// Drive-backed artifact store
#[derive(Clone, Debug)]
pub struct DriveStore {
    client: Client,
    token: String,
    api_base: Url,
    upload_base: Url,
}

impl DriveStore {
    /// Create a store against the public Drive endpoints
    pub fn new(token: impl Into<String>) -> Result<Self, StoreError> {
        Self::with_base_urls(token, DRIVE_API_BASE, DRIVE_UPLOAD_BASE)
    }

    /// Create a store against custom endpoints (used by tests and proxies)
    pub fn with_base_urls(
        token: impl Into<String>,
        api_base: &str,
        upload_base: &str,
    ) -> Result<Self, StoreError> {
        let parse = |raw: &str| {
            Url::parse(raw).map_err(|e| StoreError::Protocol(format!("invalid base URL {raw}: {e}")))
        };
        Ok(Self {
            client: Self::build_client(DRIVE_REQUEST_TIMEOUT)?,
            token: token.into(),
            api_base: parse(api_base)?,
            upload_base: parse(upload_base)?,
        })
    }

    /// Replace the per-request timeout (default [`DRIVE_REQUEST_TIMEOUT`])
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, StoreError> {
        self.client = Self::build_client(timeout)?;
        Ok(self)
    }

    fn build_client(timeout: Duration) -> Result<Client, StoreError> {
        Ok(Client::builder()
            .user_agent(concat!("epi-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?)
    }

    fn file_url(base: &Url, id: Option<&ArtifactId>) -> Result<Url, StoreError> {
        let mut url = base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| StoreError::Protocol(format!("{base} cannot be a base URL")))?;
            segments.pop_if_empty().push("files");
            if let Some(id) = id {
                segments.push(id.as_str());
            }
        }
        url.query_pairs_mut().append_pair("supportsAllDrives", "true");
        Ok(url)
    }

    /// Map a non-success response to a store error
    async fn reject(resp: Response, missing: &str) -> StoreError {
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return StoreError::NotFound(missing.to_string());
        }
        let body = resp.text().await.unwrap_or_default();
        StoreError::Rejected {
            status: status.as_u16(),
            body,
        }
    }

    async fn returned_id(resp: Response) -> Result<ArtifactId, StoreError> {
        let file: FileResource = resp
            .json()
            .await
            .map_err(|e| StoreError::Protocol(format!("undecodable file resource: {e}")))?;
        file.id
            .map(ArtifactId::new)
            .ok_or_else(|| StoreError::Protocol("file resource has no id".to_string()))
    }
}

/// Build a `multipart/related` body holding JSON metadata and the file content
fn multipart_body(boundary: &str, metadata: &serde_json::Value, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {CSV_MIME}\r\n\r\n").as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[async_trait]
impl RemoteStore for DriveStore {
    async fn create(
        &self,
        local: &Path,
        folder_id: &str,
        name: &str,
    ) -> Result<ArtifactId, StoreError> {
        let content = tokio::fs::read(local).await?;
        let boundary = format!("epi-sync-{:016x}", rand::random::<u64>());
        let metadata = serde_json::json!({
            "name": name,
            "parents": [folder_id],
            "mimeType": CSV_MIME,
        });

        let mut url = Self::file_url(&self.upload_base, None)?;
        url.query_pairs_mut()
            .append_pair("uploadType", "multipart")
            .append_pair("fields", "id");

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(multipart_body(&boundary, &metadata, &content))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::reject(resp, folder_id).await);
        }
        let id = Self::returned_id(resp).await?;
        tracing::info!(artifact_id = %id, folder_id, name, "Created Drive file");
        Ok(id)
    }

    async fn update(&self, id: &ArtifactId, local: &Path) -> Result<ArtifactId, StoreError> {
        let content = tokio::fs::read(local).await?;
        let mut url = Self::file_url(&self.upload_base, Some(id))?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("fields", "id");

        let resp = self
            .client
            .patch(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, CSV_MIME)
            .body(content)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::reject(resp, id.as_str()).await);
        }
        let updated = match Self::returned_id(resp).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(
                    artifact_id = %id,
                    error = %e,
                    "Update accepted but response unreadable, keeping id"
                );
                id.clone()
            }
        };
        tracing::info!(artifact_id = %updated, "Updated Drive file");
        Ok(updated)
    }

    async fn exists(&self, id: &ArtifactId) -> Result<bool, StoreError> {
        let mut url = Self::file_url(&self.api_base, Some(id))?;
        url.query_pairs_mut().append_pair("fields", "id,trashed");

        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => {
                #[derive(Deserialize)]
                struct Probe {
                    #[serde(default)]
                    trashed: bool,
                }
                let probe: Probe = resp
                    .json()
                    .await
                    .map_err(|e| StoreError::Protocol(format!("undecodable file resource: {e}")))?;
                Ok(!probe.trashed)
            }
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::reject(resp, id.as_str()).await),
        }
    }

    async fn download(&self, id: &ArtifactId, local: &Path) -> Result<(), StoreError> {
        let mut url = Self::file_url(&self.api_base, Some(id))?;
        url.query_pairs_mut().append_pair("alt", "media");

        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::reject(resp, id.as_str()).await);
        }
        let bytes = resp.bytes().await?;
        tokio::fs::write(local, &bytes).await?;
        tracing::debug!(artifact_id = %id, bytes = bytes.len(), "Downloaded Drive file");
        Ok(())
    }
}
