//! Storage configuration
//!
//! Persisted as JSON next to the databases. Every field has a default, so a
//! partial file (or none at all) is valid.

use crate::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default capacity of the preference store (legacy note list lives there too)
pub const DEFAULT_LEGACY_CAPACITY_BYTES: u64 = 5 * 1024 * 1024;

/// Default debounce quiet period for whole-collection saves
pub const DEFAULT_WRITE_DEBOUNCE_MS: u64 = 500;

/// Default upper bound on how long a biometric prompt may pend
pub const DEFAULT_BIOMETRIC_TIMEOUT_SECS: u64 = 60;

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding both database files
    pub data_dir: PathBuf,
    /// Primary note database file name
    pub database_file: String,
    /// Preference (key-value) store file name
    pub preferences_file: String,
    /// Byte capacity of the preference store
    pub legacy_capacity_bytes: u64,
    /// Quiet period before a scheduled save fires
    pub write_debounce_ms: u64,
    /// Fragment size used by content chunking
    pub max_chunk_size: usize,
    /// Upper bound on a biometric prompt
    pub biometric_timeout_secs: u64,
    /// Storage quota reported by usage estimates, if known
    pub quota_bytes: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            database_file: "notes.db".to_string(),
            preferences_file: "preferences.db".to_string(),
            legacy_capacity_bytes: DEFAULT_LEGACY_CAPACITY_BYTES,
            write_debounce_ms: DEFAULT_WRITE_DEBOUNCE_MS,
            max_chunk_size: crate::record_store::DEFAULT_CHUNK_SIZE,
            biometric_timeout_secs: DEFAULT_BIOMETRIC_TIMEOUT_SECS,
            quota_bytes: None,
        }
    }
}

impl StorageConfig {
    /// Platform data directory for the app, or `./notebox-data` when the
    /// platform has no home directory.
    pub fn default_data_dir() -> PathBuf {
        ProjectDirs::from("org", "notebox", "Notebox")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("notebox-data"))
    }

    /// Same config rooted at another directory
    pub fn with_data_dir<P: Into<PathBuf>>(mut self, data_dir: P) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Full path of the note database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    /// Full path of the preference store
    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join(&self.preferences_file)
    }

    /// Debounce quiet period
    pub fn write_debounce(&self) -> Duration {
        Duration::from_millis(self.write_debounce_ms)
    }

    /// Biometric prompt timeout
    pub fn biometric_timeout(&self) -> Duration {
        Duration::from_secs(self.biometric_timeout_secs)
    }

    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
