//! HTTP client for the MOPH open-data report endpoint

use super::{PartitionSource, RowBatch, flatten_response};
use crate::config::{ApiConfig, RetryConfig};
use crate::error::{Error, PartitionFetchError, Result};
use crate::retry::with_retry;
use crate::types::Partition;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;

/// Request body understood by the report endpoint
#[derive(Serialize, Debug)]
struct ReportRequest<'a> {
    #[serde(rename = "tableName")]
    table_name: &'a str,
    year: String,
    province: &'a str,
    #[serde(rename = "type")]
    format: &'static str,
}

/// Production [`PartitionSource`] issuing one POST per partition
///
/// The client holds no per-call state, so a single instance can be shared by
/// every in-flight fetch.
#[derive(Clone, Debug)]
pub struct ReportApiClient {
    client: Client,
    endpoint: Url,
    table_name: String,
    accepted_statuses: Vec<u16>,
    retry: RetryConfig,
}

impl ReportApiClient {
    /// Create a client from the API and retry settings
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the endpoint is not a valid URL.
    /// Returns `Error::Network` if the HTTP client cannot be built.
    pub fn new(api: &ApiConfig, retry: RetryConfig) -> Result<Self> {
        let endpoint = Url::parse(&api.endpoint).map_err(|e| {
            Error::config("api.endpoint", format!("invalid endpoint {}: {e}", api.endpoint))
        })?;

        let client = Client::builder()
            .user_agent(api.user_agent.as_str())
            .timeout(api.request_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            table_name: api.table_name.clone(),
            accepted_statuses: api.accepted_statuses.clone(),
            retry,
        })
    }

    /// Endpoint the client posts to
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn request_once(
        &self,
        partition: &Partition,
    ) -> std::result::Result<RowBatch, PartitionFetchError> {
        let body = ReportRequest {
            table_name: &self.table_name,
            year: partition.year.to_string(),
            province: &partition.province_code,
            format: "json",
        };

        let transport = |source: reqwest::Error| PartitionFetchError::Transport {
            partition: partition.clone(),
            source,
        };

        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status().as_u16();
        if !self.accepted_statuses.contains(&status) {
            tracing::warn!(
                province = %partition.province_code,
                year = partition.year,
                status,
                "Failed to retrieve partition"
            );
            return Err(PartitionFetchError::Status {
                partition: partition.clone(),
                status,
            });
        }

        let bytes = resp.bytes().await.map_err(transport)?;
        let document: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| PartitionFetchError::Body {
                partition: partition.clone(),
                reason: e.to_string(),
            })?;
        let rows = flatten_response(document).map_err(|reason| PartitionFetchError::Body {
            partition: partition.clone(),
            reason,
        })?;

        tracing::debug!(
            province = %partition.province_code,
            year = partition.year,
            rows = rows.len(),
            "Fetched partition"
        );
        Ok(RowBatch::new(rows))
    }
}

#[async_trait]
impl PartitionSource for ReportApiClient {
    async fn fetch_partition(
        &self,
        partition: &Partition,
    ) -> std::result::Result<RowBatch, PartitionFetchError> {
        with_retry(&self.retry, || self.request_once(partition)).await
    }
}
