// Per-project snapshot history on top of the durable medium.
//
// Key layout: `project_snapshots_<projectPath>` holds the ordered JSON array
// of snapshot records (oldest first); the opaque replicated-state blob is
// base64 inside each record.

use palimpsest_common::error::VersionError;
use palimpsest_common::types::{HealthStatus, Snapshot, StorageHealth};

use crate::store::medium::{DurableMedium, MediumError};
use crate::store::recovery;

pub const SNAPSHOT_KEY_PREFIX: &str = "project_snapshots_";
/// Key prefix for the live (non-snapshotted) replicated state of a project,
/// persisted independently of the snapshot history.
pub const LIVE_STATE_KEY_PREFIX: &str = "project_live_";

pub const MIN_MAX_SNAPSHOTS: usize = 5;
pub const MAX_MAX_SNAPSHOTS: usize = 100;
pub const DEFAULT_MAX_SNAPSHOTS: usize = 50;

/// Quota estimate used for health reporting when the medium declares no
/// hard capacity (mirrors typical browser local-storage budgets).
pub const DEFAULT_QUOTA_ESTIMATE_BYTES: u64 = 5 * 1024 * 1024;

const WARNING_USAGE_PERCENT: f64 = 70.0;
const CRITICAL_USAGE_PERCENT: f64 = 90.0;

/// Raw usage numbers backing the health report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageStats {
    pub used_bytes: u64,
    pub estimated_quota_bytes: u64,
    pub usage_percentage: f64,
    pub project_snapshot_count: usize,
}

/// Capacity-bounded snapshot history, at most `max_snapshots` entries per
/// project after any successful write.
pub struct SnapshotStore<M: DurableMedium> {
    medium: M,
    max_snapshots: usize,
}

impl<M: DurableMedium> SnapshotStore<M> {
    /// `max_snapshots` is clamped to [5, 100] to avoid pathological
    /// configurations.
    pub fn new(medium: M, max_snapshots: usize) -> Self {
        Self { medium, max_snapshots: max_snapshots.clamp(MIN_MAX_SNAPSHOTS, MAX_MAX_SNAPSHOTS) }
    }

    pub fn max_snapshots(&self) -> usize {
        self.max_snapshots
    }

    /// Append a snapshot, evicting oldest entries past `max_snapshots`, and
    /// persist through the quota-recovery protocol.
    pub fn append(&mut self, project_path: &str, snapshot: Snapshot) -> Result<(), VersionError> {
        let key = key_for(project_path);
        let mut history = self.load_history(&key)?;

        history.push(snapshot);
        if history.len() > self.max_snapshots {
            let excess = history.len() - self.max_snapshots;
            history.drain(..excess);
        }

        recovery::write_history_with_recovery(&mut self.medium, &key, &mut history)
    }

    /// Stored snapshots, oldest first.
    pub fn list(&self, project_path: &str) -> Result<Vec<Snapshot>, VersionError> {
        self.load_history(&key_for(project_path))
    }

    pub fn get(&self, project_path: &str, id: &str) -> Result<Option<Snapshot>, VersionError> {
        let history = self.load_history(&key_for(project_path))?;
        Ok(history.into_iter().find(|snapshot| snapshot.id == id))
    }

    /// Most recent stored snapshot, the change-detection baseline.
    pub fn latest(&self, project_path: &str) -> Result<Option<Snapshot>, VersionError> {
        let mut history = self.load_history(&key_for(project_path))?;
        Ok(history.pop())
    }

    /// Remove one snapshot by id; returns whether anything was deleted.
    pub fn delete(&mut self, project_path: &str, id: &str) -> Result<bool, VersionError> {
        let key = key_for(project_path);
        let mut history = self.load_history(&key)?;
        let before = history.len();
        history.retain(|snapshot| snapshot.id != id);
        if history.len() == before {
            return Ok(false);
        }

        recovery::write_history_with_recovery(&mut self.medium, &key, &mut history)?;
        Ok(true)
    }

    pub fn usage_stats(&self, project_path: &str) -> Result<UsageStats, VersionError> {
        let used_bytes = self.medium.used_bytes().map_err(backend_error)?;
        let estimated_quota_bytes =
            self.medium.capacity_bytes().unwrap_or(DEFAULT_QUOTA_ESTIMATE_BYTES);
        let usage_percentage = if estimated_quota_bytes == 0 {
            100.0
        } else {
            used_bytes as f64 / estimated_quota_bytes as f64 * 100.0
        };
        let project_snapshot_count = self.load_history(&key_for(project_path))?.len();

        Ok(UsageStats { used_bytes, estimated_quota_bytes, usage_percentage, project_snapshot_count })
    }

    /// Proactive health report: degrade before quota is actually hit, since
    /// recovering after the fact may trim other projects' data.
    pub fn storage_health(&self, project_path: &str) -> Result<StorageHealth, VersionError> {
        let stats = self.usage_stats(project_path)?;

        let mut warnings = Vec::new();
        let mut recommendations = Vec::new();

        let status = if stats.usage_percentage > CRITICAL_USAGE_PERCENT {
            warnings.push(format!(
                "durable storage is {:.0}% full; the next snapshot may trigger quota recovery",
                stats.usage_percentage
            ));
            recommendations
                .push("delete old snapshots or lower max_snapshots now".to_string());
            HealthStatus::Critical
        } else if stats.usage_percentage > WARNING_USAGE_PERCENT {
            warnings.push(format!(
                "durable storage is {:.0}% full",
                stats.usage_percentage
            ));
            recommendations.push("consider deleting snapshots you no longer need".to_string());
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        if stats.project_snapshot_count >= self.max_snapshots {
            warnings.push(format!(
                "snapshot history is at its cap of {}; each new snapshot evicts the oldest",
                self.max_snapshots
            ));
        }

        Ok(StorageHealth {
            status,
            usage_percentage: stats.usage_percentage,
            used_bytes: stats.used_bytes,
            estimated_quota_bytes: stats.estimated_quota_bytes,
            project_snapshot_count: stats.project_snapshot_count,
            warnings,
            recommendations,
        })
    }

    /// Persist the live replicated state under its own key.
    ///
    /// This channel carries edits made since the latest snapshot across a
    /// process restart; it is written on mutation, not on a timer.
    pub fn save_live_state(
        &mut self,
        project_path: &str,
        state: &[u8],
    ) -> Result<(), VersionError> {
        match self.medium.put(&live_key_for(project_path), state) {
            Ok(()) => Ok(()),
            Err(MediumError::QuotaExceeded) => Err(VersionError::StorageExhausted),
            Err(MediumError::Backend(error)) => Err(VersionError::Storage(error.to_string())),
        }
    }

    /// Previously persisted live state, if any.
    pub fn load_live_state(&self, project_path: &str) -> Result<Option<Vec<u8>>, VersionError> {
        self.medium.get(&live_key_for(project_path)).map_err(backend_error)
    }

    fn load_history(&self, key: &str) -> Result<Vec<Snapshot>, VersionError> {
        match self.medium.get(key).map_err(backend_error)? {
            None => Ok(Vec::new()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|error| {
                VersionError::Storage(format!("undecodable snapshot history at `{key}`: {error}"))
            }),
        }
    }
}

pub(crate) fn key_for(project_path: &str) -> String {
    format!("{SNAPSHOT_KEY_PREFIX}{project_path}")
}

pub(crate) fn live_key_for(project_path: &str) -> String {
    format!("{LIVE_STATE_KEY_PREFIX}{project_path}")
}

pub(crate) fn encode_history(history: &[Snapshot]) -> Result<Vec<u8>, VersionError> {
    serde_json::to_vec(history)
        .map_err(|error| VersionError::Storage(format!("failed to encode history: {error}")))
}

fn backend_error(error: MediumError) -> VersionError {
    VersionError::Storage(error.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use palimpsest_common::types::FileState;

    use super::*;
    use crate::store::medium::MemoryMedium;

    fn snapshot(version: u64, content: &str) -> Snapshot {
        let mut files = BTreeMap::new();
        files.insert("main.tex".to_string(), FileState::new(content.to_string()));
        Snapshot {
            id: format!("snapshot_{version}"),
            project_path: "/p".to_string(),
            timestamp: Utc::now(),
            description: "test".to_string(),
            files,
            state: vec![version as u8],
            version,
        }
    }

    fn store() -> SnapshotStore<MemoryMedium> {
        SnapshotStore::new(MemoryMedium::new(), DEFAULT_MAX_SNAPSHOTS)
    }

    // ── Basic history operations ───────────────────────────────────

    #[test]
    fn append_list_get_delete_round_trip() {
        let mut store = store();
        store.append("/p", snapshot(1, "a")).unwrap();
        store.append("/p", snapshot(2, "b")).unwrap();

        let listed = store.list("/p").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].version, 1);
        assert_eq!(listed[1].version, 2);

        assert_eq!(store.get("/p", "snapshot_1").unwrap().unwrap().version, 1);
        assert!(store.get("/p", "missing").unwrap().is_none());
        assert_eq!(store.latest("/p").unwrap().unwrap().version, 2);

        assert!(store.delete("/p", "snapshot_1").unwrap());
        assert!(!store.delete("/p", "snapshot_1").unwrap());
        assert_eq!(store.list("/p").unwrap().len(), 1);
    }

    #[test]
    fn projects_are_namespaced() {
        let mut store = store();
        store.append("/p1", snapshot(1, "a")).unwrap();
        store.append("/p2", snapshot(1, "b")).unwrap();

        assert_eq!(store.list("/p1").unwrap().len(), 1);
        assert_eq!(store.list("/p2").unwrap().len(), 1);
        assert!(store.get("/p1", "snapshot_1").unwrap().is_some());
        assert!(store.delete("/p1", "snapshot_1").unwrap());
        assert_eq!(store.list("/p2").unwrap().len(), 1);
    }

    #[test]
    fn empty_project_lists_nothing() {
        let store = store();
        assert!(store.list("/nowhere").unwrap().is_empty());
        assert!(store.latest("/nowhere").unwrap().is_none());
    }

    // ── Eviction ───────────────────────────────────────────────────

    #[test]
    fn append_evicts_oldest_past_the_cap() {
        let mut store = SnapshotStore::new(MemoryMedium::new(), 5);
        for version in 1..=7 {
            store.append("/p", snapshot(version, "content")).unwrap();
        }

        let listed = store.list("/p").unwrap();
        assert_eq!(listed.len(), 5);
        let versions: Vec<u64> = listed.iter().map(|s| s.version).collect();
        assert_eq!(versions, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn max_snapshots_is_clamped_to_sane_range() {
        assert_eq!(SnapshotStore::new(MemoryMedium::new(), 1).max_snapshots(), 5);
        assert_eq!(SnapshotStore::new(MemoryMedium::new(), 10_000).max_snapshots(), 100);
        assert_eq!(SnapshotStore::new(MemoryMedium::new(), 42).max_snapshots(), 42);
    }

    // ── Live state ─────────────────────────────────────────────────

    #[test]
    fn live_state_round_trips_independently_of_history() {
        let mut store = store();
        assert!(store.load_live_state("/p").unwrap().is_none());

        store.save_live_state("/p", &[1, 2, 3]).unwrap();
        store.append("/p", snapshot(1, "a")).unwrap();

        assert_eq!(store.load_live_state("/p").unwrap().unwrap(), vec![1, 2, 3]);
        assert_eq!(store.list("/p").unwrap().len(), 1);

        // Overwrite in place; histories of other projects stay untouched.
        store.save_live_state("/p", &[9]).unwrap();
        assert_eq!(store.load_live_state("/p").unwrap().unwrap(), vec![9]);
        assert!(store.load_live_state("/other").unwrap().is_none());
    }

    #[test]
    fn live_state_write_surfaces_quota_exhaustion() {
        let mut store = SnapshotStore::new(MemoryMedium::with_capacity_bytes(8), 5);
        let result = store.save_live_state("/p", &[0u8; 64]);
        assert!(matches!(result, Err(VersionError::StorageExhausted)));
    }

    // ── Health ─────────────────────────────────────────────────────

    #[test]
    fn health_is_healthy_on_an_empty_store() {
        let store = store();
        let health = store.storage_health("/p").unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.project_snapshot_count, 0);
        assert!(health.warnings.is_empty());
    }

    #[test]
    fn health_degrades_with_usage() {
        // 100-byte budget; fill ~80% for warning, ~95% for critical.
        let mut medium = MemoryMedium::with_capacity_bytes(100);
        medium.put("cache_pad", &[0u8; 71]).unwrap(); // 80 bytes with key
        let store = SnapshotStore::new(medium, 10);
        assert_eq!(store.storage_health("/p").unwrap().status, HealthStatus::Warning);

        let mut medium = MemoryMedium::with_capacity_bytes(100);
        medium.put("cache_pad", &[0u8; 86]).unwrap(); // 95 bytes with key
        let store = SnapshotStore::new(medium, 10);
        let health = store.storage_health("/p").unwrap();
        assert_eq!(health.status, HealthStatus::Critical);
        assert!(!health.recommendations.is_empty());
    }

    #[test]
    fn health_warns_when_history_is_at_cap() {
        let mut store = SnapshotStore::new(MemoryMedium::new(), 5);
        for version in 1..=5 {
            store.append("/p", snapshot(version, "x")).unwrap();
        }

        let health = store.storage_health("/p").unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.warnings.iter().any(|w| w.contains("cap of 5")));
    }
}
