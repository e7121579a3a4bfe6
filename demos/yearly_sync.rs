//! Yearly sync example
//!
//! Runs one sync the way a scheduled job would:
//! - Loading configuration from a JSON file
//! - Publishing to Google Drive with a bearer token from the environment
//! - Printing run events as they arrive
//!
//! Usage:
//!
//! ```text
//! DRIVE_TOKEN=ya29... cargo run --example yearly_sync -- config.json
//! DRIVE_TOKEN=ya29... cargo run --example yearly_sync -- config.json --retransform <raw-id>
//! ```
//!
//! With `LOCAL_STORE=<dir>` set, artifacts are written to that directory instead
//! of Drive (no token needed).

use epi_sync::publish::{DriveStore, LocalDirStore, RemoteStore};
use epi_sync::{ArtifactId, Config, Event, Pipeline, run_with_shutdown};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let config_path = PathBuf::from(args.next().ok_or("usage: yearly_sync <config.json>")?);
    let retransform = match (args.next().as_deref(), args.next()) {
        (Some("--retransform"), Some(id)) => Some(ArtifactId::new(id)),
        (None, _) => None,
        _ => return Err("usage: yearly_sync <config.json> [--retransform <raw-id>]".into()),
    };

    let config = Config::from_json_file(&config_path)?;

    let store: Arc<dyn RemoteStore> = match std::env::var("LOCAL_STORE") {
        Ok(root) => {
            let store = LocalDirStore::new(root);
            store.ensure_folder(&config.destination_folder_id).await?;
            Arc::new(store)
        }
        Err(_) => Arc::new(DriveStore::new(std::env::var("DRIVE_TOKEN")?)?),
    };

    let pipeline = Pipeline::from_config(config, store)?;

    let mut events = pipeline.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::RunStarted { partitions } => {
                    println!("Fetching {} partitions", partitions);
                }
                Event::PartitionFailed { failure } => {
                    println!(
                        "✗ {} ({:?}): {}",
                        failure.partition, failure.status_code, failure.reason
                    );
                }
                Event::FetchCompleted {
                    succeeded,
                    failed,
                    rows,
                } => {
                    println!("Fetched {} rows ({} ok, {} failed)", rows, succeeded, failed);
                }
                Event::Reshaped {
                    raw_rows,
                    long_rows,
                } => {
                    println!("Reshaped {} wide rows into {} long rows", raw_rows, long_rows);
                }
                Event::Published {
                    artifact_id,
                    updated,
                } => {
                    let verb = if updated { "Updated" } else { "Created" };
                    println!("✓ {} artifact {}", verb, artifact_id);
                }
                Event::RunFailed { error } => {
                    println!("✗ Run failed: {}", error);
                }
                Event::PartitionFetched { .. } => {}
            }
        }
    });

    let report = match retransform {
        Some(raw_id) => pipeline.retransform(&raw_id).await?,
        None => run_with_shutdown(&pipeline).await?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
