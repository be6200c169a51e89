// Replicated project document built on yrs (y-crdt Rust bindings).
//
// One yrs document holds the whole project: a root `Text` per tracked file
// path plus a root `Map` registry of known paths, so the path set travels
// with the encoded state and can be recovered from a snapshot blob alone.

use anyhow::{Context, Result};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, Map, ReadTxn, StateVector, Text, TextRef, Transact, Update};

/// Root map registering every tracked file path.
const FILE_REGISTRY: &str = "__files";
/// Root text names are prefixed so a file path can never collide with the
/// registry map's own name.
const TEXT_PREFIX: &str = "file:";

/// All buffers of one project as a single replicated document.
///
/// Concurrent edits from any number of sources converge deterministically;
/// this is the only place the engine relies on CRDT merge semantics.
pub struct ProjectDoc {
    doc: Doc,
}

impl ProjectDoc {
    /// Create a new empty project document.
    pub fn new() -> Self {
        Self { doc: Doc::new() }
    }

    /// Create a document with a specific client ID (for deterministic testing).
    pub fn with_client_id(client_id: u64) -> Self {
        let options = yrs::Options { client_id, ..Default::default() };
        Self { doc: Doc::with_options(options) }
    }

    /// Load a document from an encoded full state.
    pub fn from_state(data: &[u8]) -> Result<Self> {
        let doc = Doc::new();
        let update = Update::decode_v1(data).context("failed to decode replicated state")?;
        doc.transact_mut()
            .apply_update(update)
            .context("failed to apply replicated state update")?;
        Ok(Self { doc })
    }

    /// Apply an incremental binary update (merge against current state).
    pub fn apply_update(&self, data: &[u8]) -> Result<()> {
        let update = Update::decode_v1(data).context("failed to decode update")?;
        self.doc.transact_mut().apply_update(update).context("failed to apply update")?;
        Ok(())
    }

    /// Encode the full document state as an opaque binary blob.
    pub fn encode_state(&self) -> Vec<u8> {
        self.doc.transact().encode_state_as_update_v1(&StateVector::default())
    }

    /// Encode the state vector (logical timestamp).
    pub fn encode_state_vector(&self) -> Vec<u8> {
        self.doc.transact().state_vector().encode_v1()
    }

    /// Compute an update containing all changes since the given state vector.
    pub fn encode_diff(&self, remote_sv: &[u8]) -> Result<Vec<u8>> {
        let sv = StateVector::decode_v1(remote_sv).context("failed to decode state vector")?;
        Ok(self.doc.transact().encode_diff_v1(&sv))
    }

    /// Register `path` and create its (possibly empty) text buffer.
    pub fn ensure_file(&self, path: &str) {
        let registry = self.doc.get_or_insert_map(FILE_REGISTRY);
        let _ = self.doc.get_or_insert_text(text_name(path).as_str());

        let known = registry.get(&self.doc.transact(), path).is_some();
        if !known {
            let mut txn = self.doc.transact_mut();
            registry.insert(&mut txn, path, true);
        }
    }

    /// Whether `path` is registered in this document.
    pub fn contains_file(&self, path: &str) -> bool {
        let registry = self.doc.get_or_insert_map(FILE_REGISTRY);
        registry.get(&self.doc.transact(), path).is_some()
    }

    /// All registered file paths, sorted.
    pub fn file_paths(&self) -> Vec<String> {
        let registry = self.doc.get_or_insert_map(FILE_REGISTRY);
        let txn = self.doc.transact();
        let mut paths: Vec<String> =
            registry.iter(&txn).map(|(path, _)| path.to_string()).collect();
        paths.sort();
        paths
    }

    /// Current text of `path`'s buffer (empty if never written).
    pub fn text_of(&self, path: &str) -> String {
        let text = self.text_ref(path);
        text.get_string(&self.doc.transact())
    }

    /// Length of `path`'s buffer in UTF-8 bytes.
    pub fn text_len(&self, path: &str) -> u32 {
        let text = self.text_ref(path);
        text.len(&self.doc.transact())
    }

    /// Insert `content` at byte `index` in a transaction tagged with `origin`.
    pub fn insert_text(&self, path: &str, index: u32, content: &str, origin: &str) {
        let text = self.text_ref(path);
        let mut txn = self.doc.transact_mut_with(origin);
        text.insert(&mut txn, index, content);
    }

    /// Remove `len` bytes starting at `index`, tagged with `origin`.
    pub fn remove_text(&self, path: &str, index: u32, len: u32, origin: &str) {
        let text = self.text_ref(path);
        let mut txn = self.doc.transact_mut_with(origin);
        text.remove_range(&mut txn, index, len);
    }

    /// Remove a range and insert replacement text in one transaction.
    pub fn replace_text(&self, path: &str, index: u32, len: u32, content: &str, origin: &str) {
        let text = self.text_ref(path);
        let mut txn = self.doc.transact_mut_with(origin);
        text.remove_range(&mut txn, index, len);
        text.insert(&mut txn, index, content);
    }

    /// Replace the buffer's entire content in a single transaction.
    ///
    /// This is a full replace, not a patch: bound widgets observe it as one
    /// ordinary local edit, which is what restoration requires.
    pub fn set_text(&self, path: &str, content: &str, origin: &str) {
        let text = self.text_ref(path);
        let mut txn = self.doc.transact_mut_with(origin);
        let current_len = text.len(&txn);
        if current_len > 0 {
            text.remove_range(&mut txn, 0, current_len);
        }
        if !content.is_empty() {
            text.insert(&mut txn, 0, content);
        }
    }

    fn text_ref(&self, path: &str) -> TextRef {
        self.doc.get_or_insert_text(text_name(path).as_str())
    }
}

impl Default for ProjectDoc {
    fn default() -> Self {
        Self::new()
    }
}

fn text_name(path: &str) -> String {
    format!("{TEXT_PREFIX}{path}")
}
