// Top-level handle tying documents, snapshots, and auto-save together.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use palimpsest_common::error::VersionError;
use palimpsest_common::types::{Snapshot, SnapshotComparison, StorageHealth};

use crate::autosave::AutoSaveScheduler;
use crate::config::EngineConfig;
use crate::documents::{BindingHandle, DocumentStore, EditorWidget};
use crate::restore;
use crate::snapshot;
use crate::store::medium::DurableMedium;
use crate::store::snapshots::SnapshotStore;

const MANUAL_SNAPSHOT_DESCRIPTION: &str = "manual";

/// Shared mutable state behind one project handle.
///
/// Document and snapshot state live under a single lock so an auto-save
/// tick never captures a half-applied edit.
pub(crate) struct ProjectInner<M: DurableMedium> {
    pub(crate) documents: DocumentStore,
    pub(crate) snapshots: SnapshotStore<M>,
}

/// One open project: live buffers, snapshot history, auto-save timer.
pub struct Project<M: DurableMedium + 'static> {
    inner: Arc<Mutex<ProjectInner<M>>>,
    project_path: String,
    scheduler: AutoSaveScheduler<M>,
}

impl<M: DurableMedium + 'static> Project<M> {
    /// Open a project over the given durable medium.
    ///
    /// Starts the auto-save timer when the config enables it; in that case
    /// the call must happen within a Tokio runtime.
    pub fn open(project_path: impl Into<String>, medium: M, config: &EngineConfig) -> Self {
        let project_path = project_path.into();
        let snapshots = SnapshotStore::new(medium, config.storage.clamped_max_snapshots());
        let documents = load_live_documents(&snapshots, &project_path);
        let inner = Arc::new(Mutex::new(ProjectInner { documents, snapshots }));

        let mut scheduler = AutoSaveScheduler::new(
            Arc::clone(&inner),
            project_path.clone(),
            config.auto_save.clamped_interval_secs(),
        );
        if config.auto_save.enabled {
            scheduler.start();
        }

        info!(
            project = %project_path,
            auto_save = config.auto_save.enabled,
            max_snapshots = config.storage.clamped_max_snapshots(),
            "project opened"
        );
        Self { inner, project_path, scheduler }
    }

    pub fn project_path(&self) -> &str {
        &self.project_path
    }

    // ── Documents ──────────────────────────────────────────────────

    /// Bind a path's buffer to a live widget (last-bind-wins).
    pub fn bind_file(
        &self,
        path: &str,
        widget: Arc<dyn EditorWidget>,
    ) -> Result<BindingHandle, VersionError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let result = inner.documents.bind(path, widget);
        // Binding may have registered a new path; keep the live copy current.
        self.persist_live(inner);
        result
    }

    /// Release the binding for `path`; buffer content is kept.
    pub fn unbind_file(&self, path: &str) {
        self.lock().documents.unbind(path);
    }

    /// Current buffer text, or `None` for a path never seen.
    pub fn file_text(&self, path: &str) -> Option<String> {
        self.lock().documents.get_text(path)
    }

    /// All tracked paths, sorted.
    pub fn file_paths(&self) -> Vec<String> {
        self.lock().documents.known_paths()
    }

    /// Seed a buffer from external storage; no-op unless the buffer is empty.
    pub fn seed_file(&self, path: &str, text: &str) -> Result<bool, VersionError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let seeded = inner.documents.apply_initial_content(path, text)?;
        self.persist_live(inner);
        Ok(seeded)
    }

    pub fn insert_text(&self, path: &str, index: u32, text: &str) -> Result<(), VersionError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.documents.insert(path, index, text)?;
        self.persist_live(inner);
        Ok(())
    }

    pub fn remove_text(&self, path: &str, index: u32, len: u32) -> Result<(), VersionError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.documents.remove(path, index, len)?;
        self.persist_live(inner);
        Ok(())
    }

    pub fn replace_text(
        &self,
        path: &str,
        index: u32,
        len: u32,
        text: &str,
    ) -> Result<(), VersionError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.documents.replace(path, index, len, text)?;
        self.persist_live(inner);
        Ok(())
    }

    /// Insert submitted by the widget behind `handle`; ignored when stale.
    pub fn widget_insert(&self, handle: &BindingHandle, index: u32, text: &str) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let applied = inner.documents.insert_via(handle, index, text);
        if applied {
            self.persist_live(inner);
        }
        applied
    }

    /// Removal submitted by the widget behind `handle`; ignored when stale.
    pub fn widget_remove(&self, handle: &BindingHandle, index: u32, len: u32) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let applied = inner.documents.remove_via(handle, index, len);
        if applied {
            self.persist_live(inner);
        }
        applied
    }

    // ── Snapshots ──────────────────────────────────────────────────

    /// Capture a snapshot now. `None` means nothing changed since the
    /// latest snapshot.
    pub fn create_snapshot(
        &self,
        description: Option<&str>,
    ) -> Result<Option<Snapshot>, VersionError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        snapshot::create_snapshot(
            &inner.documents,
            &mut inner.snapshots,
            &self.project_path,
            description.unwrap_or(MANUAL_SNAPSHOT_DESCRIPTION),
        )
    }

    /// Revert live buffers to a stored snapshot. `false` for an unknown id.
    pub fn restore_snapshot(&self, snapshot_id: &str) -> Result<bool, VersionError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let restored =
            restore::restore(&mut inner.documents, &inner.snapshots, &self.project_path, snapshot_id)?;
        if restored {
            self.persist_live(inner);
        }
        Ok(restored)
    }

    /// Stored snapshots, oldest first.
    pub fn snapshots(&self) -> Result<Vec<Snapshot>, VersionError> {
        self.lock().snapshots.list(&self.project_path)
    }

    pub fn get_snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>, VersionError> {
        self.lock().snapshots.get(&self.project_path, snapshot_id)
    }

    /// Remove one snapshot by id; returns whether anything was deleted.
    pub fn delete_snapshot(&self, snapshot_id: &str) -> Result<bool, VersionError> {
        self.lock().snapshots.delete(&self.project_path, snapshot_id)
    }

    /// Path-by-path comparison of two stored snapshots.
    pub fn compare_snapshots(
        &self,
        from_id: &str,
        to_id: &str,
    ) -> Result<SnapshotComparison, VersionError> {
        restore::compare(&self.lock().snapshots, &self.project_path, from_id, to_id)
    }

    pub fn storage_health(&self) -> Result<StorageHealth, VersionError> {
        self.lock().snapshots.storage_health(&self.project_path)
    }

    // ── Auto-save ──────────────────────────────────────────────────

    pub fn set_auto_save_enabled(&mut self, enabled: bool) {
        self.scheduler.set_enabled(enabled);
    }

    pub fn set_auto_save_interval(&mut self, interval_secs: u64) {
        self.scheduler.set_interval(interval_secs);
    }

    pub fn auto_save_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Stop the auto-save timer, capture a final snapshot if anything
    /// changed since the latest one, and flush the live state.
    pub fn close(mut self) -> Result<Option<Snapshot>, VersionError> {
        self.scheduler.stop();
        let final_snapshot = self.create_snapshot(Some("close"))?;

        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let state = inner.documents.doc().encode_state();
            inner.snapshots.save_live_state(&self.project_path, &state)?;
        }

        info!(project = %self.project_path, "project closed");
        Ok(final_snapshot)
    }

    /// Write the live replicated state through to the durable medium.
    ///
    /// Best-effort on the edit path: the latest snapshot remains the durable
    /// fallback, so a failed live write is logged, not surfaced.
    fn persist_live(&self, inner: &mut ProjectInner<M>) {
        let state = inner.documents.doc().encode_state();
        if let Err(error) = inner.snapshots.save_live_state(&self.project_path, &state) {
            warn!(project = %self.project_path, error = %error, "failed to persist live state");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProjectInner<M>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load_live_documents<M: DurableMedium>(
    snapshots: &SnapshotStore<M>,
    project_path: &str,
) -> DocumentStore {
    match snapshots.load_live_state(project_path) {
        Ok(Some(state)) => match DocumentStore::from_state(&state) {
            Ok(documents) => documents,
            Err(error) => {
                warn!(project = project_path, error = %error, "live state undecodable, starting empty");
                DocumentStore::new()
            }
        },
        Ok(None) => DocumentStore::new(),
        Err(error) => {
            warn!(project = project_path, error = %error, "failed to read live state, starting empty");
            DocumentStore::new()
        }
    }
}
