// Core domain types shared across the Palimpsest workspace.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diff::DiffResult;

/// Frozen content of a single file inside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileState {
    pub content: String,
    /// Content size in bytes at capture time.
    pub size: u64,
}

impl FileState {
    pub fn new(content: String) -> Self {
        let size = content.len() as u64;
        Self { content, size }
    }
}

/// An immutable, versioned capture of every tracked file in a project.
///
/// `state` is the opaque replicated-document blob sufficient to exactly
/// reconstruct all buffers; `files` is a plain value-copy of each file's
/// text for display and diffing, independent of later edits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub id: String,
    pub project_path: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    /// Keyed by normalized project-relative path.
    pub files: BTreeMap<String, FileState>,
    /// Encoded replicated state, base64 inside the JSON record.
    #[serde(with = "base64_blob")]
    pub state: Vec<u8>,
    /// Strictly increasing per project; gaps may appear after eviction.
    pub version: u64,
}

/// How a single path changed between two snapshots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Added,
    Removed,
    Modified,
    Unchanged,
}

/// Per-path result of comparing two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileComparison {
    pub path: String,
    pub kind: FileChangeKind,
    /// Line diff, present only for modified paths.
    pub diff: Option<DiffResult>,
}

/// Aggregate comparison between two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotComparison {
    pub from_id: String,
    pub to_id: String,
    pub files: Vec<FileComparison>,
    pub files_added: usize,
    pub files_removed: usize,
    pub files_modified: usize,
    pub files_unchanged: usize,
    /// Line totals summed over modified paths.
    pub lines_added: usize,
    pub lines_removed: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Proactive storage-health report, surfaced before quota is actually hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageHealth {
    pub status: HealthStatus,
    pub usage_percentage: f64,
    pub used_bytes: u64,
    pub estimated_quota_bytes: u64,
    pub project_snapshot_count: usize,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

mod base64_blob {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
