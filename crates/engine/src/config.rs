// Local configuration for the versioning engine.
//
// Global config: `~/.palimpsest/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::autosave::{
    DEFAULT_AUTO_SAVE_INTERVAL_SECS, MAX_AUTO_SAVE_INTERVAL_SECS, MIN_AUTO_SAVE_INTERVAL_SECS,
};
use crate::store::snapshots::{DEFAULT_MAX_SNAPSHOTS, MAX_MAX_SNAPSHOTS, MIN_MAX_SNAPSHOTS};

/// Root directory for Palimpsest global state: `~/.palimpsest/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".palimpsest"))
}

/// Path to the global config file: `~/.palimpsest/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Default path of the durable snapshot database: `~/.palimpsest/snapshots.db`.
pub fn default_store_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("snapshots.db"))
}

// ── Engine config ──────────────────────────────────────────────────

/// Engine configuration at `~/.palimpsest/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
#[derive(Default)]
pub struct EngineConfig {
    /// Auto-save settings.
    pub auto_save: AutoSaveConfig,
    /// Snapshot storage settings.
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Load from `~/.palimpsest/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to `~/.palimpsest/config.toml`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = global_config_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            ))
        })?;
        self.save_to(&path)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Auto-save settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutoSaveConfig {
    /// Whether the auto-save scheduler starts when a project opens.
    pub enabled: bool,
    /// Seconds between auto-save ticks (clamped to [5, 3600]).
    pub interval_secs: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self { enabled: true, interval_secs: DEFAULT_AUTO_SAVE_INTERVAL_SECS }
    }
}

impl AutoSaveConfig {
    pub fn clamped_interval_secs(&self) -> u64 {
        self.interval_secs.clamp(MIN_AUTO_SAVE_INTERVAL_SECS, MAX_AUTO_SAVE_INTERVAL_SECS)
    }
}

/// Snapshot storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshots retained per project (clamped to [5, 100]).
    pub max_snapshots: usize,
    /// Durable database path override (defaults to `~/.palimpsest/snapshots.db`).
    pub store_path: Option<PathBuf>,
    /// Hard byte budget for the durable medium; unset means the medium's own
    /// limit (or the 5 MiB health estimate) applies.
    pub capacity_bytes: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { max_snapshots: DEFAULT_MAX_SNAPSHOTS, store_path: None, capacity_bytes: None }
    }
}

impl StorageConfig {
    pub fn clamped_max_snapshots(&self) -> usize {
        self.max_snapshots.clamp(MIN_MAX_SNAPSHOTS, MAX_MAX_SNAPSHOTS)
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
