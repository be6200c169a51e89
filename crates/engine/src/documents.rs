// Per-path replicated text buffers and their live widget bindings.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use palimpsest_common::error::VersionError;
use palimpsest_common::path::normalize_path;

use crate::crdt::ProjectDoc;

/// Transaction origin for edits arriving from a bound widget.
pub const WIDGET_ORIGIN: &str = "widget";
/// Transaction origin for programmatic edits (action layer).
pub const ACTION_ORIGIN: &str = "action";
/// Transaction origin for seeding a buffer from external storage.
pub const SEED_ORIGIN: &str = "seed";
/// Transaction origin for snapshot restoration.
pub const RESTORE_ORIGIN: &str = "restore";

/// Live text-editing surface for one document.
///
/// The engine only needs to push full text into it; edits flow back through
/// the [`BindingHandle`] returned by [`DocumentStore::bind`].
pub trait EditorWidget: Send + Sync {
    fn set_text(&self, text: &str) -> anyhow::Result<()>;
}

/// Token for one binding generation of one path.
///
/// A handle issued before a rebind is stale: edits submitted through it are
/// ignored, so a torn-down widget can never write into the buffer it lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingHandle {
    path: String,
    generation: u64,
}

impl BindingHandle {
    pub fn path(&self) -> &str {
        &self.path
    }
}

struct Binding {
    widget: Arc<dyn EditorWidget>,
    generation: u64,
}

/// Holds one replicated text buffer per project-relative path and connects
/// buffers to at most one live widget each (last-bind-wins).
pub struct DocumentStore {
    doc: ProjectDoc,
    bindings: HashMap<String, Binding>,
    next_generation: u64,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self { doc: ProjectDoc::new(), bindings: HashMap::new(), next_generation: 1 }
    }

    /// Rebuild a store from previously persisted replicated state.
    /// Bindings do not survive persistence; widgets re-bind after load.
    pub fn from_state(data: &[u8]) -> anyhow::Result<Self> {
        Ok(Self { doc: ProjectDoc::from_state(data)?, bindings: HashMap::new(), next_generation: 1 })
    }

    pub fn doc(&self) -> &ProjectDoc {
        &self.doc
    }

    /// Bind `path` to a widget, creating an empty buffer on first use.
    ///
    /// Any previous binding for the path is torn down first. The widget is
    /// seeded with the buffer's current text; if that hookup fails the path
    /// is left unbound and the failure is reported as
    /// [`VersionError::Binding`].
    pub fn bind(
        &mut self,
        path: &str,
        widget: Arc<dyn EditorWidget>,
    ) -> Result<BindingHandle, VersionError> {
        let path = normalize_path(path)?;
        self.doc.ensure_file(&path);

        // Last-bind-wins: the old widget stops receiving writes now.
        self.bindings.remove(&path);

        if let Err(error) = widget.set_text(&self.doc.text_of(&path)) {
            warn!(path = %path, error = %error, "widget hookup failed, leaving path unbound");
            return Err(VersionError::Binding { path, reason: error.to_string() });
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.bindings.insert(path.clone(), Binding { widget, generation });
        Ok(BindingHandle { path, generation })
    }

    /// Release the binding for `path`. Idempotent; buffer content is kept.
    pub fn unbind(&mut self, path: &str) {
        let Ok(path) = normalize_path(path) else {
            return;
        };
        self.bindings.remove(&path);
    }

    pub fn is_bound(&self, path: &str) -> bool {
        normalize_path(path).map(|p| self.bindings.contains_key(&p)).unwrap_or(false)
    }

    /// Current buffer text, or `None` for a path never seen.
    pub fn get_text(&self, path: &str) -> Option<String> {
        let path = normalize_path(path).ok()?;
        if !self.doc.contains_file(&path) {
            return None;
        }
        Some(self.doc.text_of(&path))
    }

    /// All tracked paths, sorted.
    pub fn known_paths(&self) -> Vec<String> {
        self.doc.file_paths()
    }

    /// Seed a buffer from external storage.
    ///
    /// A merge against an empty buffer, not an overwrite: if the buffer
    /// already has content this is a no-op, so concurrent edits are never
    /// clobbered. Returns whether the seed was applied.
    pub fn apply_initial_content(&mut self, path: &str, text: &str) -> Result<bool, VersionError> {
        let path = normalize_path(path)?;
        self.doc.ensure_file(&path);

        if text.is_empty() || self.doc.text_len(&path) > 0 {
            return Ok(false);
        }

        self.doc.insert_text(&path, 0, text, SEED_ORIGIN);
        self.echo(&path);
        Ok(true)
    }

    /// Programmatic insert (action layer); echoed to the bound widget.
    pub fn insert(&mut self, path: &str, index: u32, text: &str) -> Result<(), VersionError> {
        let path = normalize_path(path)?;
        self.doc.ensure_file(&path);
        self.doc.insert_text(&path, index, text, ACTION_ORIGIN);
        self.echo(&path);
        Ok(())
    }

    /// Programmatic removal (action layer); echoed to the bound widget.
    pub fn remove(&mut self, path: &str, index: u32, len: u32) -> Result<(), VersionError> {
        let path = normalize_path(path)?;
        self.doc.ensure_file(&path);
        self.doc.remove_text(&path, index, len, ACTION_ORIGIN);
        self.echo(&path);
        Ok(())
    }

    /// Programmatic range replace (action layer); echoed to the bound widget.
    pub fn replace(
        &mut self,
        path: &str,
        index: u32,
        len: u32,
        text: &str,
    ) -> Result<(), VersionError> {
        let path = normalize_path(path)?;
        self.doc.ensure_file(&path);
        self.doc.replace_text(&path, index, len, text, ACTION_ORIGIN);
        self.echo(&path);
        Ok(())
    }

    /// Insert coming from the widget behind `handle`.
    ///
    /// Returns `false` (and applies nothing) when the handle is stale, i.e.
    /// the path has been rebound or unbound since the handle was issued.
    /// Widget edits are not echoed back to their own widget.
    pub fn insert_via(&mut self, handle: &BindingHandle, index: u32, text: &str) -> bool {
        if !self.handle_is_current(handle) {
            return false;
        }
        self.doc.insert_text(&handle.path, index, text, WIDGET_ORIGIN);
        true
    }

    /// Removal coming from the widget behind `handle`; see [`Self::insert_via`].
    pub fn remove_via(&mut self, handle: &BindingHandle, index: u32, len: u32) -> bool {
        if !self.handle_is_current(handle) {
            return false;
        }
        self.doc.remove_text(&handle.path, index, len, WIDGET_ORIGIN);
        true
    }

    /// Force every buffer to the given full-state content (restoration).
    ///
    /// Paths absent from `files` but alive in the store are cleared to empty;
    /// paths are never deleted. All bound widgets observe the result as a
    /// normal local edit.
    pub fn apply_full_state(&mut self, files: &[(String, String)]) {
        for (path, content) in files {
            self.doc.ensure_file(path);
            self.doc.set_text(path, content, RESTORE_ORIGIN);
            self.echo(path);
        }

        let restored: std::collections::HashSet<&str> =
            files.iter().map(|(path, _)| path.as_str()).collect();
        for path in self.doc.file_paths() {
            if !restored.contains(path.as_str()) {
                self.doc.set_text(&path, "", RESTORE_ORIGIN);
                self.echo(&path);
            }
        }
    }

    fn handle_is_current(&self, handle: &BindingHandle) -> bool {
        self.bindings
            .get(&handle.path)
            .map(|binding| binding.generation == handle.generation)
            .unwrap_or(false)
    }

    /// Push the buffer's current text to the bound widget, if any.
    fn echo(&self, path: &str) {
        if let Some(binding) = self.bindings.get(path) {
            if let Err(error) = binding.widget.set_text(&self.doc.text_of(path)) {
                warn!(path = %path, error = %error, "widget rejected echoed content");
            }
        }
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}
