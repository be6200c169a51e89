// Capacity-bounded key-value durable medium.
//
// The snapshot store never talks to sqlite directly; it writes through this
// trait so the quota-exceeded contract can be exercised against an in-memory
// medium in tests and satisfied by whatever the host platform provides.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediumError {
    /// The write would exceed the medium's byte budget.
    #[error("write rejected: durable medium capacity exceeded")]
    QuotaExceeded,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// A durable, capacity-bounded key-value store.
///
/// `put` must reject a write with [`MediumError::QuotaExceeded`] when the
/// entry would push total usage past the configured budget; every other
/// failure is a backend error. Entry size is accounted as key bytes plus
/// value bytes.
pub trait DurableMedium: Send {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, MediumError>;
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), MediumError>;
    fn remove(&mut self, key: &str) -> Result<(), MediumError>;
    fn keys(&self) -> Result<Vec<String>, MediumError>;
    fn used_bytes(&self) -> Result<u64, MediumError>;
    /// Hard byte budget, if the medium has one.
    fn capacity_bytes(&self) -> Option<u64>;
}

// ── In-memory medium ───────────────────────────────────────────────

/// `BTreeMap`-backed medium with the same budget contract as the durable
/// implementations. Used by tests and by hosts that persist elsewhere.
pub struct MemoryMedium {
    entries: BTreeMap<String, Vec<u8>>,
    capacity: Option<u64>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new(), capacity: None }
    }

    pub fn with_capacity_bytes(capacity: u64) -> Self {
        Self { entries: BTreeMap::new(), capacity: Some(capacity) }
    }

    fn usage(&self) -> u64 {
        self.entries.iter().map(|(key, value)| (key.len() + value.len()) as u64).sum()
    }
}

impl Default for MemoryMedium {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableMedium for MemoryMedium {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, MediumError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), MediumError> {
        if let Some(capacity) = self.capacity {
            let existing = self.entries.get(key).map(|v| (key.len() + v.len()) as u64).unwrap_or(0);
            let prospective = self.usage() - existing + (key.len() + value.len()) as u64;
            if prospective > capacity {
                return Err(MediumError::QuotaExceeded);
            }
        }
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), MediumError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, MediumError> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn used_bytes(&self) -> Result<u64, MediumError> {
        Ok(self.usage())
    }

    fn capacity_bytes(&self) -> Option<u64> {
        self.capacity
    }
}

// ── Sqlite medium ──────────────────────────────────────────────────

const MIGRATION_V1_SQL: &str = "
CREATE TABLE kv (
    key     TEXT PRIMARY KEY,
    value   BLOB NOT NULL
);
";

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1_SQL)];

/// Sqlite-backed durable medium, one `kv` table per database file.
pub struct SqliteMedium {
    conn: Connection,
    capacity: Option<u64>,
}

impl SqliteMedium {
    /// Open (creating parent directories and schema as needed).
    pub fn open(path: impl AsRef<Path>, capacity: Option<u64>) -> Result<Self, MediumError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create store parent directory `{}`", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open store at `{}`", path.display()))?;
        Self::from_connection(conn, capacity)
    }

    /// Open an in-memory database (for tests).
    pub fn in_memory(capacity: Option<u64>) -> Result<Self, MediumError> {
        let conn = Connection::open_in_memory().context("failed to open in-memory store")?;
        Self::from_connection(conn, capacity)
    }

    fn from_connection(mut conn: Connection, capacity: Option<u64>) -> Result<Self, MediumError> {
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .context("failed to configure sqlite pragmas")?;
        ensure_migration_table(&conn)?;
        apply_pending_migrations(&mut conn)?;
        Ok(Self { conn, capacity })
    }

    fn entry_bytes(&self, key: &str) -> Result<u64, MediumError> {
        let size: Option<i64> = self
            .conn
            .query_row("SELECT LENGTH(key) + LENGTH(value) FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .context("failed to measure kv entry")?;
        Ok(size.unwrap_or(0) as u64)
    }
}

impl DurableMedium for SqliteMedium {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, MediumError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .context("failed to read kv entry")?;
        Ok(value)
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), MediumError> {
        if let Some(capacity) = self.capacity {
            let existing = self.entry_bytes(key)?;
            let prospective =
                self.used_bytes()? - existing + (key.len() + value.len()) as u64;
            if prospective > capacity {
                return Err(MediumError::QuotaExceeded);
            }
        }

        self.conn
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2) \
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .context("failed to write kv entry")?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), MediumError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", [key])
            .context("failed to delete kv entry")?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, MediumError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv ORDER BY key ASC")
            .context("failed to prepare kv key listing")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("failed to list kv keys")?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to collect kv keys")
            .map_err(MediumError::from)
    }

    fn used_bytes(&self) -> Result<u64, MediumError> {
        let used: i64 = self
            .conn
            .query_row("SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) FROM kv", [], |row| {
                row.get(0)
            })
            .context("failed to measure kv usage")?;
        Ok(used as u64)
    }

    fn capacity_bytes(&self) -> Option<u64> {
        self.capacity
    }
}

fn ensure_migration_table(conn: &Connection) -> Result<(), MediumError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );
        ",
    )
    .context("failed to ensure schema_migrations table exists")
    .map_err(MediumError::from)
}

fn current_schema_version(conn: &Connection) -> Result<i64, MediumError> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| row.get(0))
        .context("failed to read current schema version")
        .map_err(MediumError::from)
}

fn apply_pending_migrations(conn: &mut Connection) -> Result<(), MediumError> {
    let mut current_version = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }

        let tx = conn.transaction().context("failed to start migration transaction")?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply store migration v{version}"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            params![version],
        )
        .with_context(|| format!("failed to record migration v{version}"))?;
        tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
        current_version = *version;
    }

    Ok(())
}
