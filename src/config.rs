//! Configuration types for epi-sync

use crate::error::{Error, Result};
use crate::partition;
use crate::types::{ArtifactId, Destination};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which partitions a run fetches
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Every province for a single year (the current BE year unless `year` is set)
    #[default]
    SingleYear,
    /// Every province for every year from `start_year` up to, not including, the current BE year
    Historical,
}

/// What to do when every partition failed to fetch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyResultPolicy {
    /// Abort the run before reshaping (default)
    #[default]
    Abort,
    /// Publish a header-only table
    PublishEmpty,
}

/// Reporting API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Endpoint receiving the report POST requests
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Table requested from the API (default: "s_epi_complete")
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Timeout for a single HTTP request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Ceiling for one partition including retries (default: 120 seconds)
    ///
    /// A partition that has not settled when this elapses is recorded as failed,
    /// so one hung request cannot hold the run open indefinitely.
    #[serde(default = "default_partition_timeout", with = "duration_serde")]
    pub partition_timeout: Duration,

    /// HTTP status codes treated as success (default: 200, 201)
    #[serde(default = "default_accepted_statuses")]
    pub accepted_statuses: Vec<u16>,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            table_name: default_table_name(),
            request_timeout: default_request_timeout(),
            partition_timeout: default_partition_timeout(),
            accepted_statuses: default_accepted_statuses(),
            user_agent: default_user_agent(),
        }
    }
}

/// Retry configuration for transient partition failures
///
/// The default performs no retries: a failed partition is recorded on the first
/// attempt, matching the behavior of a plain fetch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 0)
    #[serde(default)]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Optional export of the untransformed wide table
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawExportConfig {
    /// Folder for the raw artifact (default: the main destination folder)
    #[serde(default)]
    pub folder_id: Option<String>,

    /// Raw artifact to update in place
    #[serde(default)]
    pub existing_artifact_id: Option<ArtifactId>,

    /// File name of the raw artifact (default: "s_epi_complete_data_all.csv")
    #[serde(default = "default_raw_file_name")]
    pub file_name: String,
}

impl Default for RawExportConfig {
    fn default() -> Self {
        Self {
            folder_id: None,
            existing_artifact_id: None,
            file_name: default_raw_file_name(),
        }
    }
}

/// Local staging and output naming
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for staging files before upload (default: system temp dir)
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// File name of the long table (default: "optimized_s_epi_complete_data_all.csv")
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Raw wide-table export (disabled when absent)
    #[serde(default)]
    pub raw: Option<RawExportConfig>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            file_name: default_file_name(),
            raw: None,
        }
    }
}

/// Main configuration for a pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Run mode: "single-year" or "historical"
    #[serde(default)]
    pub mode: RunMode,

    /// Target BE year for single-year mode (default: current BE year)
    #[serde(default)]
    pub year: Option<u32>,

    /// First BE year fetched in historical mode (default: 2557)
    #[serde(default = "default_start_year")]
    pub start_year: u32,

    /// Maximum in-flight partition fetches (default: 20)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Folder new artifacts are created in
    #[serde(default, rename = "destinationFolderId", alias = "destination_folder_id")]
    pub destination_folder_id: String,

    /// Previously published artifact to overwrite
    #[serde(
        default,
        rename = "existingArtifactId",
        alias = "existing_artifact_id"
    )]
    pub existing_artifact_id: Option<ArtifactId>,

    /// Behavior when every partition fails
    #[serde(default)]
    pub empty_result_policy: EmptyResultPolicy,

    /// Reporting API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Per-partition retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Staging and output naming
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            year: None,
            start_year: default_start_year(),
            concurrency: default_concurrency(),
            destination_folder_id: String::new(),
            existing_artifact_id: None,
            empty_result_policy: EmptyResultPolicy::default(),
            api: ApiConfig::default(),
            retry: RetryConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Validate the configuration against the current BE year
    pub fn validate(&self) -> Result<()> {
        self.validate_at(partition::current_be_year())
    }

    /// Validate the configuration against an explicit current BE year
    pub fn validate_at(&self, current_be_year: u32) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::config(
                "concurrency",
                "concurrency must be greater than zero",
            ));
        }
        if self.destination_folder_id.trim().is_empty() {
            return Err(Error::config(
                "destinationFolderId",
                "a destination folder id is required",
            ));
        }
        if let Err(e) = url::Url::parse(&self.api.endpoint) {
            return Err(Error::config(
                "api.endpoint",
                format!("invalid endpoint {}: {e}", self.api.endpoint),
            ));
        }
        if self.api.accepted_statuses.is_empty() {
            return Err(Error::config(
                "api.accepted_statuses",
                "at least one accepted status is required",
            ));
        }
        if self.mode == RunMode::Historical && self.start_year >= current_be_year {
            return Err(Error::config(
                "start_year",
                format!(
                    "start year {} must be before the current year {current_be_year}",
                    self.start_year
                ),
            ));
        }
        if self.output.file_name.trim().is_empty() {
            return Err(Error::config("output.file_name", "file name is empty"));
        }
        self.retry.validate()
    }

    /// Destination of the long table
    pub fn destination(&self) -> Destination {
        Destination {
            folder_id: self.destination_folder_id.clone(),
            existing_artifact_id: self.existing_artifact_id.clone(),
            file_name: self.output.file_name.clone(),
        }
    }

    /// Destination of the raw wide table, when raw export is enabled
    pub fn raw_destination(&self) -> Option<Destination> {
        self.output.raw.as_ref().map(|raw| Destination {
            folder_id: raw
                .folder_id
                .clone()
                .unwrap_or_else(|| self.destination_folder_id.clone()),
            existing_artifact_id: raw.existing_artifact_id.clone(),
            file_name: raw.file_name.clone(),
        })
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<()> {
        let multiplier = self.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                format!("backoff multiplier {multiplier} must be a finite number of at least 1.0"),
            ));
        }
        if self.max_delay > MAX_RETRY_DELAY {
            return Err(Error::config(
                "retry.max_delay",
                format!(
                    "max delay of {}s exceeds the {}s limit",
                    self.max_delay.as_secs(),
                    MAX_RETRY_DELAY.as_secs()
                ),
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(Error::config(
                "retry.initial_delay",
                "initial delay must not exceed max delay",
            ));
        }
        Ok(())
    }
}

/// Longest accepted backoff between retries
const MAX_RETRY_DELAY: Duration = Duration::from_secs(3600);

fn default_endpoint() -> String {
    "https://opendata.moph.go.th/api/report_data".to_string()
}

fn default_table_name() -> String {
    "s_epi_complete".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_partition_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_accepted_statuses() -> Vec<u16> {
    vec![200, 201]
}

fn default_user_agent() -> String {
    format!("epi-sync/{}", env!("CARGO_PKG_VERSION"))
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_start_year() -> u32 {
    partition::HISTORICAL_START_YEAR
}

fn default_concurrency() -> usize {
    20
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_file_name() -> String {
    "optimized_s_epi_complete_data_all.csv".to_string()
}

fn default_raw_file_name() -> String {
    "s_epi_complete_data_all.csv".to_string()
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
