// Snapshot creation: change detection, capture, versioning.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use palimpsest_common::error::VersionError;
use palimpsest_common::types::{FileState, Snapshot};

use crate::documents::DocumentStore;
use crate::store::medium::DurableMedium;
use crate::store::snapshots::SnapshotStore;

/// Freeze every tracked buffer into a value-copied file map.
pub fn capture_files(documents: &DocumentStore) -> BTreeMap<String, FileState> {
    documents
        .known_paths()
        .into_iter()
        .map(|path| {
            let content = documents.get_text(&path).unwrap_or_default();
            (path, FileState::new(content))
        })
        .collect()
}

/// Whether current content differs from the latest stored snapshot.
///
/// Only the latest snapshot is the baseline: editing back to an *older*
/// snapshot's content still counts as a change. This is de-duplication of
/// unchanged auto-save ticks, not content-addressing.
pub fn content_changed(
    current: &BTreeMap<String, FileState>,
    latest: Option<&Snapshot>,
) -> bool {
    let Some(latest) = latest else {
        return true;
    };

    if current.len() != latest.files.len() {
        return true;
    }
    for (path, state) in current {
        match latest.files.get(path) {
            Some(prior) if prior.content == state.content => {}
            _ => return true,
        }
    }
    // Any path present before but absent now is already covered by the
    // length check plus the per-path scan above.
    false
}

/// Capture the project if its content changed since the latest snapshot.
///
/// Returns `None` when nothing changed (a skipped tick, not an error).
pub fn create_snapshot<M: DurableMedium>(
    documents: &DocumentStore,
    store: &mut SnapshotStore<M>,
    project_path: &str,
    description: &str,
) -> Result<Option<Snapshot>, VersionError> {
    let files = capture_files(documents);
    let latest = store.latest(project_path)?;

    if !content_changed(&files, latest.as_ref()) {
        debug!(project = project_path, "content unchanged since latest snapshot, skipping");
        return Ok(None);
    }

    let now = Utc::now();
    let snapshot = Snapshot {
        id: generate_snapshot_id(now),
        project_path: project_path.to_string(),
        timestamp: now,
        description: description.to_string(),
        files,
        state: documents.doc().encode_state(),
        version: latest.map(|snapshot| snapshot.version + 1).unwrap_or(1),
    };

    store.append(project_path, snapshot.clone())?;
    info!(
        project = project_path,
        id = %snapshot.id,
        version = snapshot.version,
        files = snapshot.files.len(),
        "snapshot created"
    );
    Ok(Some(snapshot))
}

/// Time-based id with a random suffix; collisions are negligible.
fn generate_snapshot_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("snapshot_{}_{}", now.timestamp_millis(), &suffix[..8])
}
