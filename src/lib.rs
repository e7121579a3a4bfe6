//! # epi-sync
//!
//! Fetches the `s_epi_complete` immunization-coverage table from the Thai
//! Ministry of Public Health open-data API, reshapes it from one row per
//! facility-year (24 monthly columns) to one row per facility-month, and publishes
//! the result as a single CSV artifact that is updated in place on every run.
//!
//! ## Pipeline
//!
//! 1. [`partition`] enumerates (province, Buddhist Era year) units
//! 2. [`orchestrator`] fetches them concurrently through a [`fetch::PartitionSource`]
//! 3. [`schema`] validates the wide rows, [`reshape`] turns them into long rows
//! 4. [`publish`] writes the table to a [`publish::RemoteStore`]
//!
//! A partition that fails to fetch is recorded and the run continues. Schema drift
//! and store failures abort the run before anything is overwritten.
//!
//! ## Quick Start
//!
//! ```no_run
//! use epi_sync::{Config, Pipeline, run_with_shutdown};
//! use epi_sync::publish::DriveStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         destination_folder_id: "1kUloOi3JWbVmXUl4sTT8d5OBn_IZ0dkV".to_string(),
//!         ..Default::default()
//!     };
//!     let store = DriveStore::new(std::env::var("DRIVE_TOKEN")?)?;
//!     let pipeline = Pipeline::from_config(config, Arc::new(store))?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = run_with_shutdown(&pipeline).await?;
//!     println!("Published {}", report.artifact_id);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Report-type catalog
pub mod catalog;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Reporting API client and response flattening
pub mod fetch;
/// Concurrent partition fetching
pub mod orchestrator;
/// Partition enumeration
pub mod partition;
/// End-to-end pipeline runs
pub mod pipeline;
/// Output serialization and remote stores
pub mod publish;
/// Wide-to-long reshaping
pub mod reshape;
/// Retry logic with exponential backoff
pub mod retry;
/// Wide-row schema validation
pub mod schema;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, EmptyResultPolicy, RunMode};
pub use error::{Error, PartitionFetchError, PublishError, Result, StoreError, TransformationError};
pub use pipeline::Pipeline;
pub use publish::{Publisher, RemoteStore};
pub use types::{
    ArtifactId, Destination, Event, LongRecord, Partition, PartitionFailure, RawRecord, RunReport,
};

/// Run the pipeline once with graceful signal handling
///
/// A termination signal cancels the pipeline's token: no further partitions are
/// dispatched, in-flight fetches settle, and the run returns
/// [`Error::Cancelled`] without publishing.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(pipeline: &Pipeline) -> Result<RunReport> {
    let cancel = pipeline.cancel_token();
    let run = pipeline.run();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => result,
        () = wait_for_signal() => {
            tracing::info!("Stopping dispatch, waiting for in-flight partitions");
            cancel.cancel();
            run.await
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                ctrl_c_or_never().await;
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                ctrl_c_or_never().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c_or_never().await;
}

/// Wait for Ctrl+C; if it cannot be observed, never resolve so the run is not cancelled
async fn ctrl_c_or_never() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}
