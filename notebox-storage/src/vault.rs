//! One-stop wiring of the storage core from a [`StorageConfig`]

use crate::biometric::{fallback_gate, BiometricGate, Platform};
use crate::config::StorageConfig;
use crate::credentials::{CredentialStore, ProtectionScope};
use crate::database::DatabaseHandle;
use crate::kv_store::{KeyValueStore, SqliteKeyValueStore};
use crate::protection::ProtectionManager;
use crate::record_store::RecordStore;
use crate::write_scheduler::WriteScheduler;
use crate::Result;
use std::sync::Arc;

/// Record store, protection manager and write scheduler sharing one data
/// directory
pub struct NoteVault {
    config: StorageConfig,
    records: Arc<RecordStore>,
    protection: ProtectionManager,
    scheduler: WriteScheduler,
}

impl NoteVault {
    /// Open the vault and run the one-shot legacy migration.
    ///
    /// A failed migration is logged and retried on the next open; it does not
    /// prevent the vault from opening.
    pub async fn open(config: StorageConfig, biometric: Arc<dyn BiometricGate>) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let prefs: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::open(
            config.preferences_path(),
            Some(config.legacy_capacity_bytes),
        )?);
        let records = Arc::new(
            RecordStore::new(DatabaseHandle::new(config.database_path()), Arc::clone(&prefs))
                .with_quota(config.quota_bytes)
                .with_chunk_size(config.max_chunk_size),
        );
        let protection = ProtectionManager::new(
            CredentialStore::new(prefs),
            biometric,
            config.biometric_timeout(),
        );
        let scheduler = WriteScheduler::new(records.clone(), config.write_debounce());

        match records.migrate_legacy_to_store().await {
            Ok(outcome) => tracing::debug!("Legacy migration: {:?}", outcome),
            Err(e) => tracing::warn!("Legacy migration deferred: {}", e),
        }

        tracing::info!("Note vault opened at {}", config.data_dir.display());
        Ok(Self {
            config,
            records,
            protection,
            scheduler,
        })
    }

    /// Open with no platform biometric bridge. Biometric unlock is then
    /// unavailable and protected scopes fall back to their password.
    pub async fn open_without_biometrics(config: StorageConfig) -> Result<Self> {
        Self::open(config, fallback_gate(Platform::current())).await
    }

    /// Configuration in effect
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Record store
    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Protection manager
    pub fn protection(&self) -> &ProtectionManager {
        &self.protection
    }

    /// Write scheduler
    pub fn scheduler(&self) -> &WriteScheduler {
        &self.scheduler
    }

    /// Delete a note together with its credentials
    pub async fn delete_note(&self, id: &str) -> Result<()> {
        self.records.delete_one(id).await?;
        self.protection
            .clear_protection(&ProtectionScope::note(id))
    }

    /// Flush any pending debounced write
    pub async fn shutdown(&self) -> Result<()> {
        self.scheduler.flush().await
    }
}
