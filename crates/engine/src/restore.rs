// Restoration and comparison of stored snapshots.

use std::collections::BTreeSet;

use tracing::{info, warn};

use palimpsest_common::diff::diff_lines;
use palimpsest_common::error::VersionError;
use palimpsest_common::types::{FileChangeKind, FileComparison, SnapshotComparison};

use crate::crdt::ProjectDoc;
use crate::documents::DocumentStore;
use crate::store::medium::DurableMedium;
use crate::store::snapshots::SnapshotStore;

/// Revert live buffers to a stored snapshot.
///
/// The snapshot's serialized state is decoded first; only once it decodes
/// cleanly is the live store touched, so a corrupt snapshot leaves live
/// state unchanged. Returns `false` when the id is unknown.
pub fn restore<M: DurableMedium>(
    documents: &mut DocumentStore,
    store: &SnapshotStore<M>,
    project_path: &str,
    snapshot_id: &str,
) -> Result<bool, VersionError> {
    let Some(snapshot) = store.get(project_path, snapshot_id)? else {
        warn!(project = project_path, id = snapshot_id, "restore requested for unknown snapshot");
        return Ok(false);
    };

    let restored_doc =
        ProjectDoc::from_state(&snapshot.state).map_err(|error| VersionError::CorruptSnapshot {
            id: snapshot_id.to_string(),
            reason: error.to_string(),
        })?;

    let files: Vec<(String, String)> = restored_doc
        .file_paths()
        .into_iter()
        .map(|path| {
            let content = restored_doc.text_of(&path);
            (path, content)
        })
        .collect();

    documents.apply_full_state(&files);
    info!(
        project = project_path,
        id = snapshot_id,
        version = snapshot.version,
        files = files.len(),
        "snapshot restored"
    );
    Ok(true)
}

/// Compare two stored snapshots path by path.
///
/// Both path sets are unioned; each path is classified as added, removed,
/// modified, or unchanged relative to the `from` snapshot, and the line
/// diff is computed only for modified paths.
pub fn compare<M: DurableMedium>(
    store: &SnapshotStore<M>,
    project_path: &str,
    from_id: &str,
    to_id: &str,
) -> Result<SnapshotComparison, VersionError> {
    let from = store
        .get(project_path, from_id)?
        .ok_or_else(|| VersionError::SnapshotNotFound(from_id.to_string()))?;
    let to = store
        .get(project_path, to_id)?
        .ok_or_else(|| VersionError::SnapshotNotFound(to_id.to_string()))?;

    let paths: BTreeSet<&String> = from.files.keys().chain(to.files.keys()).collect();

    let mut comparison = SnapshotComparison {
        from_id: from_id.to_string(),
        to_id: to_id.to_string(),
        files: Vec::new(),
        files_added: 0,
        files_removed: 0,
        files_modified: 0,
        files_unchanged: 0,
        lines_added: 0,
        lines_removed: 0,
    };

    for path in paths {
        let entry = match (from.files.get(path), to.files.get(path)) {
            (None, Some(_)) => {
                comparison.files_added += 1;
                FileComparison { path: path.clone(), kind: FileChangeKind::Added, diff: None }
            }
            (Some(_), None) => {
                comparison.files_removed += 1;
                FileComparison { path: path.clone(), kind: FileChangeKind::Removed, diff: None }
            }
            (Some(old), Some(new)) if old.content == new.content => {
                comparison.files_unchanged += 1;
                FileComparison { path: path.clone(), kind: FileChangeKind::Unchanged, diff: None }
            }
            (Some(old), Some(new)) => {
                let diff = diff_lines(&old.content, &new.content);
                comparison.files_modified += 1;
                comparison.lines_added += diff.stats.added;
                comparison.lines_removed += diff.stats.removed;
                FileComparison {
                    path: path.clone(),
                    kind: FileChangeKind::Modified,
                    diff: Some(diff),
                }
            }
            (None, None) => unreachable!("path came from one of the two snapshots"),
        };
        comparison.files.push(entry);
    }

    Ok(comparison)
}
