//! Retry with exponential backoff for partition fetches
//!
//! Partition fetches are not retried by default. When `retry.max_attempts` is
//! raised, transient failures (timeouts, refused connections, 5xx, 408 and 429
//! answers) are retried with exponential backoff and optional jitter before the
//! partition is recorded as failed. The whole sequence still runs under the
//! orchestrator's per-partition ceiling.

use crate::config::RetryConfig;
use crate::error::PartitionFetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Errors that can tell whether another attempt might succeed
pub trait IsRetryable {
    /// Returns true if the failure is transient
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for PartitionFetchError {
    fn is_retryable(&self) -> bool {
        match self {
            // Server-side trouble and throttling
            PartitionFetchError::Status { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            PartitionFetchError::Transport { source, .. } => {
                source.is_timeout() || source.is_connect()
            }
            // A body that did not parse will not parse next time either
            PartitionFetchError::Body { .. } => false,
            PartitionFetchError::Timeout { .. } => false,
        }
    }
}

/// Un-jittered delays before each retry: `initial_delay`, then multiplied by
/// `backoff_multiplier` each time, capped at `max_delay`
///
/// A product that is not a valid duration (negative, NaN, overflowing) is
/// clamped to `max_delay`.
pub fn backoff_delays(config: &RetryConfig) -> impl Iterator<Item = Duration> + '_ {
    std::iter::successors(Some(config.initial_delay.min(config.max_delay)), |prev| {
        let next = Duration::try_from_secs_f64(prev.as_secs_f64() * config.backoff_multiplier)
            .unwrap_or(config.max_delay);
        Some(next.min(config.max_delay))
    })
    .take(config.max_attempts as usize)
}

/// Run `operation`, retrying transient failures per `config`
///
/// Returns the first success, the first permanent failure, or the last failure
/// once retries are exhausted. With `max_attempts == 0` the operation runs once.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut delays = backoff_delays(config);
    let mut attempt: u32 = 1;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Fetch succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let delay = match delays.next() {
            Some(delay) if err.is_retryable() => delay,
            _ => {
                if attempt > 1 {
                    tracing::debug!(error = %err, attempts = attempt, "Giving up after retries");
                }
                return Err(err);
            }
        };

        let delay = if config.jitter { add_jitter(delay) } else { delay };
        tracing::warn!(
            error = %err,
            attempt,
            max_attempts = config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Fetch failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Stretch a delay by a random factor in `[1, 2]`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(1.0..=2.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(delay)
}
