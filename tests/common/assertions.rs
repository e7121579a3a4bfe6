//! Custom test assertions for published artifacts and run events

use epi_sync::publish::LocalDirStore;
use epi_sync::{ArtifactId, Event};
use tokio::sync::broadcast;

/// Header every published long table starts with
pub const LONG_HEADER_LINE: &str = "report_name,hospcode,areacode,b_year,date,target,result";

/// Read a published artifact as text
pub async fn read_artifact(store: &LocalDirStore, id: &ArtifactId) -> String {
    let path = store
        .artifact_path(id)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("artifact {id} was not published"));
    std::fs::read_to_string(path).unwrap()
}

/// Data lines of a long table, sorted, without the header
///
/// Cross-partition order depends on completion order, so comparisons go
/// through this.
pub fn sorted_rows(table: &str) -> Vec<String> {
    let mut lines = table.lines();
    assert_eq!(lines.next(), Some(LONG_HEADER_LINE), "unexpected header");
    let mut rows: Vec<String> = lines.map(str::to_string).collect();
    rows.sort();
    rows
}

/// Count the artifacts held in a store folder
pub fn artifact_count(store: &LocalDirStore, folder: &str) -> usize {
    match std::fs::read_dir(store.root().join(folder)) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

/// Drain every event already sent on a receiver
pub fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
