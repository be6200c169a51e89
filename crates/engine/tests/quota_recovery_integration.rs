// End-to-end quota recovery against a byte-budgeted in-memory medium.
//
// Each test pins the medium's capacity so that exactly one recovery tier is
// the first one that frees enough space, then asserts the write landed and
// the tier's side effects (and nothing more aggressive) are visible.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};

use palimpsest_common::error::VersionError;
use palimpsest_common::types::{FileState, Snapshot};
use palimpsest_engine::store::medium::{DurableMedium, MemoryMedium};
use palimpsest_engine::store::snapshots::{SnapshotStore, SNAPSHOT_KEY_PREFIX};

fn snapshot(version: u64, content: &str) -> Snapshot {
    let mut files = BTreeMap::new();
    files.insert("main.tex".to_string(), FileState::new(content.to_string()));
    Snapshot {
        id: format!("snapshot_{version}"),
        project_path: "/p".to_string(),
        // Fixed timestamp keeps encoded sizes exactly reproducible.
        timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        description: "test".to_string(),
        files,
        state: Vec::new(),
        version,
    }
}

/// Bytes one stored history entry occupies in the medium.
fn entry_size(project_path: &str, history: &[Snapshot]) -> u64 {
    let key = format!("{SNAPSHOT_KEY_PREFIX}{project_path}");
    (key.len() + serde_json::to_vec(history).unwrap().len()) as u64
}

// ── Tier 1: cache purge ────────────────────────────────────────────

#[test]
fn cache_entries_are_purged_before_anything_else() {
    let history = vec![snapshot(1, "payload")];
    let needed = entry_size("/p", &history);

    let mut medium = MemoryMedium::with_capacity_bytes(needed);
    medium.put("cache_render", &[0u8; 64]).unwrap();
    medium.put("tmp_scratch", &[0u8; 32]).unwrap();

    let mut store = SnapshotStore::new(medium, 50);
    store.append("/p", snapshot(1, "payload")).unwrap();

    // The write landed and the caches are the only thing that was removed.
    assert_eq!(store.list("/p").unwrap().len(), 1);
    assert_eq!(store.usage_stats("/p").unwrap().used_bytes, needed);
}

// ── Tier 2: trim other projects ────────────────────────────────────

#[test]
fn other_projects_are_trimmed_to_a_tail_of_five() {
    let other_full: Vec<Snapshot> = (1..=10).map(|v| snapshot(v, "small")).collect();
    let other_trimmed = &other_full[5..];
    let current = vec![snapshot(1, &"y".repeat(2_000))];

    let capacity = entry_size("/other", other_trimmed) + entry_size("/p", &current);
    assert!(entry_size("/other", &other_full) < capacity, "full other history must fit alone");

    let mut store = SnapshotStore::new(MemoryMedium::with_capacity_bytes(capacity), 50);
    for version in 1..=10 {
        store.append("/other", snapshot(version, "small")).unwrap();
    }

    store.append("/p", snapshot(1, &"y".repeat(2_000))).unwrap();

    let other: Vec<u64> = store.list("/other").unwrap().iter().map(|s| s.version).collect();
    assert_eq!(other, vec![6, 7, 8, 9, 10]);
    assert_eq!(store.list("/p").unwrap().len(), 1);
}

// ── Tier 3: trim current project ───────────────────────────────────

#[test]
fn current_project_is_trimmed_to_twenty_when_others_cannot_help() {
    let initial: Vec<Snapshot> = (1..=30).map(|v| snapshot(v, "entry")).collect();
    let capacity = entry_size("/p", &initial);

    let mut store = SnapshotStore::new(MemoryMedium::with_capacity_bytes(capacity), 50);
    for version in 1..=30 {
        store.append("/p", snapshot(version, "entry")).unwrap();
    }

    // History 31 no longer fits; caches and other projects are empty, so
    // recovery falls through to trimming the current project to 20.
    store.append("/p", snapshot(31, "entry")).unwrap();

    let versions: Vec<u64> = store.list("/p").unwrap().iter().map(|s| s.version).collect();
    assert_eq!(versions, (12..=31).collect::<Vec<u64>>());
}

// ── Tier 4: drop other projects ────────────────────────────────────

#[test]
fn other_projects_are_dropped_when_trimming_them_is_not_enough() {
    let other_full: Vec<Snapshot> = (1..=10).map(|v| snapshot(v, &"x".repeat(500))).collect();
    let other_trimmed = &other_full[5..];
    let current = vec![snapshot(1, &"y".repeat(4_000))];

    let capacity = entry_size("/other", &other_full);
    let current_size = entry_size("/p", &current);
    assert!(current_size <= capacity, "current must fit once others are gone");
    assert!(
        entry_size("/other", other_trimmed) + current_size > capacity,
        "trimmed others plus current must still exceed capacity"
    );

    let mut store = SnapshotStore::new(MemoryMedium::with_capacity_bytes(capacity), 50);
    for version in 1..=10 {
        store.append("/other", snapshot(version, &"x".repeat(500))).unwrap();
    }

    store.append("/p", snapshot(1, &"y".repeat(4_000))).unwrap();

    assert!(store.list("/other").unwrap().is_empty());
    assert_eq!(store.list("/p").unwrap().len(), 1);
}

// ── Tier 5: last-resort tail ───────────────────────────────────────

#[test]
fn last_resort_keeps_a_tail_of_ten_including_the_new_snapshot() {
    let initial: Vec<Snapshot> = (1..=12).map(|v| snapshot(v, &"a".repeat(1_000))).collect();
    let capacity = entry_size("/p", &initial);

    let incoming = snapshot(13, &"b".repeat(1_500));
    let mut tail: Vec<Snapshot> = initial[3..].to_vec();
    tail.push(incoming.clone());
    assert!(entry_size("/p", &tail) <= capacity, "ten-entry tail must fit");

    let mut store = SnapshotStore::new(MemoryMedium::with_capacity_bytes(capacity), 50);
    for version in 1..=12 {
        store.append("/p", snapshot(version, &"a".repeat(1_000))).unwrap();
    }

    store.append("/p", incoming).unwrap();

    let versions: Vec<u64> = store.list("/p").unwrap().iter().map(|s| s.version).collect();
    assert_eq!(versions, (4..=13).collect::<Vec<u64>>());
    assert_eq!(store.latest("/p").unwrap().unwrap().version, 13);
}

// ── Exhaustion ─────────────────────────────────────────────────────

#[test]
fn storage_exhausted_after_every_tier_fails() {
    let mut store = SnapshotStore::new(MemoryMedium::with_capacity_bytes(8), 50);

    let result = store.append("/p", snapshot(1, "does not fit anywhere"));
    let error = result.expect_err("write can never fit");
    assert!(matches!(error, VersionError::StorageExhausted));
    assert!(error.is_storage_exhausted());

    // Nothing was half-written.
    assert!(store.list("/p").unwrap().is_empty());
}
