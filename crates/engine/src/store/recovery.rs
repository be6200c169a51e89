// Tiered quota-exceeded recovery for snapshot writes.
//
// Each tier frees durable space with a strictly shrinking scope, then the
// rejected write is retried. The policy itself is the pure `next_tier`
// function; the executor below applies tier actions to a medium.

use tracing::warn;

use palimpsest_common::error::VersionError;
use palimpsest_common::types::Snapshot;

use crate::store::medium::{DurableMedium, MediumError};
use crate::store::snapshots::{encode_history, SNAPSHOT_KEY_PREFIX};

/// Key prefixes holding disposable temporary/cache data, purged first.
pub const CACHE_KEY_PREFIXES: &[&str] = &["cache_", "tmp_"];

/// Snapshots retained per *other* project when trimming them.
pub const OTHER_PROJECT_TAIL: usize = 5;
/// Snapshots retained for the *current* project at its trim tier.
pub const CURRENT_PROJECT_TAIL: usize = 20;
/// Snapshots written at the last-resort tier; always includes the in-flight
/// snapshot (it is the newest entry of the list being written).
pub const LAST_RESORT_TAIL: usize = 10;

/// Recovery tiers, in escalation order. Scope only ever shrinks: no tier
/// makes the writable set larger than a previous tier left it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryTier {
    /// Purge temporary/cache-prefixed keys unrelated to snapshots.
    PurgeCaches,
    /// Trim other projects' histories to a small retained tail.
    TrimOtherProjects,
    /// Trim the current project's history to a medium retained tail.
    TrimCurrentProject,
    /// Delete all other projects' histories entirely.
    DropOtherProjects,
    /// Keep only the most recent tail of the current project's history.
    KeepRecentTail,
}

/// Advance the escalation: `None` once the write succeeded, or after the
/// final tier has been tried.
pub fn next_tier(current: Option<RecoveryTier>, still_failing: bool) -> Option<RecoveryTier> {
    if !still_failing {
        return None;
    }
    match current {
        None => Some(RecoveryTier::PurgeCaches),
        Some(RecoveryTier::PurgeCaches) => Some(RecoveryTier::TrimOtherProjects),
        Some(RecoveryTier::TrimOtherProjects) => Some(RecoveryTier::TrimCurrentProject),
        Some(RecoveryTier::TrimCurrentProject) => Some(RecoveryTier::DropOtherProjects),
        Some(RecoveryTier::DropOtherProjects) => Some(RecoveryTier::KeepRecentTail),
        Some(RecoveryTier::KeepRecentTail) => None,
    }
}

/// Write the current project's history, escalating through the recovery
/// tiers on quota rejection. `history` may be trimmed in place by the
/// current-project tiers; its final element (the in-flight snapshot) is
/// never dropped.
pub(crate) fn write_history_with_recovery<M: DurableMedium>(
    medium: &mut M,
    current_key: &str,
    history: &mut Vec<Snapshot>,
) -> Result<(), VersionError> {
    let mut tier = None;

    loop {
        match medium.put(current_key, &encode_history(history)?) {
            Ok(()) => return Ok(()),
            Err(MediumError::QuotaExceeded) => {}
            Err(MediumError::Backend(error)) => {
                return Err(VersionError::Storage(error.to_string()));
            }
        }

        tier = next_tier(tier, true);
        let Some(tier) = tier else {
            return Err(VersionError::StorageExhausted);
        };

        warn!(?tier, key = current_key, "snapshot write over quota, escalating recovery");
        apply_tier(medium, tier, current_key, history)?;
    }
}

fn apply_tier<M: DurableMedium>(
    medium: &mut M,
    tier: RecoveryTier,
    current_key: &str,
    history: &mut Vec<Snapshot>,
) -> Result<(), VersionError> {
    match tier {
        RecoveryTier::PurgeCaches => {
            for key in medium.keys().map_err(backend_error)? {
                if CACHE_KEY_PREFIXES.iter().any(|prefix| key.starts_with(prefix)) {
                    medium.remove(&key).map_err(backend_error)?;
                }
            }
        }
        RecoveryTier::TrimOtherProjects => {
            for key in other_project_keys(medium, current_key)? {
                trim_stored_history(medium, &key, OTHER_PROJECT_TAIL)?;
            }
        }
        RecoveryTier::TrimCurrentProject => {
            trim_tail(history, CURRENT_PROJECT_TAIL);
        }
        RecoveryTier::DropOtherProjects => {
            for key in other_project_keys(medium, current_key)? {
                medium.remove(&key).map_err(backend_error)?;
            }
        }
        RecoveryTier::KeepRecentTail => {
            trim_tail(history, LAST_RESORT_TAIL);
        }
    }
    Ok(())
}

fn other_project_keys<M: DurableMedium>(
    medium: &M,
    current_key: &str,
) -> Result<Vec<String>, VersionError> {
    Ok(medium
        .keys()
        .map_err(backend_error)?
        .into_iter()
        .filter(|key| key.starts_with(SNAPSHOT_KEY_PREFIX) && key != current_key)
        .collect())
}

/// Rewrite a stored history keeping only its newest `tail` entries.
/// Undecodable histories are removed outright; their space is reclaimed.
fn trim_stored_history<M: DurableMedium>(
    medium: &mut M,
    key: &str,
    tail: usize,
) -> Result<(), VersionError> {
    let Some(bytes) = medium.get(key).map_err(backend_error)? else {
        return Ok(());
    };

    let Ok(mut stored) = serde_json::from_slice::<Vec<Snapshot>>(&bytes) else {
        warn!(key, "removing undecodable snapshot history during recovery");
        medium.remove(key).map_err(backend_error)?;
        return Ok(());
    };

    if stored.len() <= tail {
        return Ok(());
    }
    trim_tail(&mut stored, tail);

    // The rewrite shrinks the entry, so quota rejection here means the
    // medium cannot even hold the smaller value; leave the key for a
    // later, more aggressive tier.
    match medium.put(key, &encode_history(&stored)?) {
        Ok(()) | Err(MediumError::QuotaExceeded) => Ok(()),
        Err(MediumError::Backend(error)) => Err(VersionError::Storage(error.to_string())),
    }
}

fn trim_tail(history: &mut Vec<Snapshot>, tail: usize) {
    if history.len() > tail {
        let excess = history.len() - tail;
        history.drain(..excess);
    }
}

fn backend_error(error: MediumError) -> VersionError {
    VersionError::Storage(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Pure policy ────────────────────────────────────────────────

    #[test]
    fn tiers_escalate_in_order_and_terminate() {
        let order = [
            RecoveryTier::PurgeCaches,
            RecoveryTier::TrimOtherProjects,
            RecoveryTier::TrimCurrentProject,
            RecoveryTier::DropOtherProjects,
            RecoveryTier::KeepRecentTail,
        ];

        let mut current = None;
        for expected in order {
            current = next_tier(current, true);
            assert_eq!(current, Some(expected));
        }
        assert_eq!(next_tier(current, true), None);
    }

    #[test]
    fn success_stops_escalation_at_any_tier() {
        assert_eq!(next_tier(None, false), None);
        assert_eq!(next_tier(Some(RecoveryTier::PurgeCaches), false), None);
        assert_eq!(next_tier(Some(RecoveryTier::DropOtherProjects), false), None);
    }

    // ── Tail trimming ──────────────────────────────────────────────

    #[test]
    fn trim_tail_keeps_newest_entries() {
        let mut history: Vec<Snapshot> = (1..=7).map(sample_snapshot).collect();
        trim_tail(&mut history, 5);

        let versions: Vec<u64> = history.iter().map(|s| s.version).collect();
        assert_eq!(versions, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn trim_tail_is_a_noop_when_within_bound() {
        let mut history: Vec<Snapshot> = (1..=3).map(sample_snapshot).collect();
        trim_tail(&mut history, 5);
        assert_eq!(history.len(), 3);
    }

    fn sample_snapshot(version: u64) -> Snapshot {
        Snapshot {
            id: format!("snapshot_{version}"),
            project_path: "/p".to_string(),
            timestamp: chrono::Utc::now(),
            description: "test".to_string(),
            files: Default::default(),
            state: Vec::new(),
            version,
        }
    }
}
