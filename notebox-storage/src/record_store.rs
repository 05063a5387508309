//! Note persistence
//!
//! The primary backend is the SQLite note database behind a lazily opened
//! [`DatabaseHandle`]. The preference store holds the legacy flat list
//! (`notes`, a JSON array of [`StorageRecord`]) written by older builds.
//!
//! Fallback is deliberately one-way: loads may read the legacy list when the
//! database cannot be opened, but bulk saves never write it, because the
//! preference store is far too small for a full collection.

use crate::database::{Database, DatabaseHandle};
use crate::kv_store::KeyValueStore;
use crate::models::{timestamp, MigrationOutcome, Note, StorageEstimate, StorageRecord};
use crate::{Error, Result};
use rusqlite::{params, OptionalExtension, Transaction};
use serde::Deserialize;
use std::sync::Arc;

/// Default fragment size for [`chunk_content`]
pub const DEFAULT_CHUNK_SIZE: usize = 500_000;

/// Preference key of the legacy flat note list
pub const LEGACY_NOTES_KEY: &str = "notes";

/// Preference key of the one-shot migration flag
pub const MIGRATION_FLAG_KEY: &str = "notes_migrated_to_db";

/// Preference key holding legacy entries the migration could not decode,
/// as a JSON array of the raw entries
pub const QUARANTINE_KEY: &str = "notes_unmigrated";

/// Split `content` into fragments of `max_chunk_size` characters.
///
/// Joining the fragments reproduces `content`; every fragment but the last is
/// exactly `max_chunk_size` characters. A size of 0 means
/// [`DEFAULT_CHUNK_SIZE`]. Empty content yields no fragments.
pub fn chunk_content(content: &str, max_chunk_size: usize) -> Vec<String> {
    let size = if max_chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        max_chunk_size
    };

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for ch in content.chars() {
        current.push(ch);
        count += 1;
        if count == size {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Indexed note storage
pub struct RecordStore {
    db: DatabaseHandle,
    prefs: Arc<dyn KeyValueStore>,
    quota_bytes: Option<u64>,
    chunk_size: usize,
}

impl RecordStore {
    /// Create store. The database is opened on first use.
    pub fn new(db: DatabaseHandle, prefs: Arc<dyn KeyValueStore>) -> Self {
        Self {
            db,
            prefs,
            quota_bytes: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Quota reported by [`RecordStore::estimate_usage`]
    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Fragment size used by [`RecordStore::chunk`]; 0 means the default
    pub fn with_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.chunk_size = if max_chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            max_chunk_size
        };
        self
    }

    /// Configured fragment size
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `content` with the configured fragment size
    pub fn chunk(&self, content: &str) -> Vec<String> {
        chunk_content(content, self.chunk_size)
    }

    /// Database handle
    pub fn handle(&self) -> &DatabaseHandle {
        &self.db
    }

    /// Every stored note in collection order.
    ///
    /// Falls back to the legacy list when the database cannot be opened.
    /// Other faults yield an empty collection.
    pub async fn load_all(&self) -> Vec<Note> {
        match self.db.run(|db| read_all(db)).await {
            Ok(notes) => notes,
            Err(e) if e.is_backend_unavailable() => {
                tracing::warn!("Note database unavailable ({}), reading legacy list", e);
                self.load_legacy().unwrap_or_else(|e| {
                    tracing::error!("Legacy note list unreadable: {}", e);
                    Vec::new()
                })
            }
            Err(e) => {
                tracing::error!("Failed to load notes: {}", e);
                Vec::new()
            }
        }
    }

    /// Notes in one folder, via the folder index
    pub async fn load_by_folder(&self, folder_id: &str) -> Result<Vec<Note>> {
        let folder_id = folder_id.to_string();
        self.db
            .run(move |db| {
                let mut stmt = db.conn().prepare(
                    "SELECT id, record FROM notes WHERE folder_id = ?1 ORDER BY position, id",
                )?;
                let rows = stmt.query_map([folder_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                let mut notes = Vec::new();
                for row in rows {
                    let (id, raw) = row?;
                    if let Some(note) = decode_row(&id, &raw) {
                        notes.push(note);
                    }
                }
                Ok(notes)
            })
            .await
    }

    /// Number of stored notes
    pub async fn note_count(&self) -> Result<usize> {
        self.db
            .run(|db| {
                let count: i64 =
                    db.conn()
                        .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
    }

    /// Replace the stored collection with exactly `notes`, in one transaction.
    ///
    /// Never falls back to the legacy list.
    pub async fn save_all(&self, notes: &[Note]) -> Result<()> {
        let records = encode_all(notes)?;
        let count = records.len();
        let result = self
            .db
            .run(move |db| {
                let tx = db.transaction()?;
                tx.execute("DELETE FROM notes", [])?;
                for (position, (record, raw)) in records.iter().enumerate() {
                    insert_record(&tx, record, raw, position as i64)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::into_transaction_failure);

        match &result {
            Ok(()) => tracing::debug!("Saved {} notes", count),
            Err(e) if e.is_backend_unavailable() => tracing::error!(
                "Note database unavailable, {} notes NOT saved (no legacy fallback for bulk saves): {}",
                count,
                e
            ),
            Err(e) => tracing::error!("Saving {} notes failed, previous state kept: {}", count, e),
        }
        result
    }

    /// Insert or update one note, leaving the others untouched.
    ///
    /// An existing note keeps its position; a new one is appended. The stored
    /// `updated_at` never decreases.
    pub async fn save_one(&self, note: &Note) -> Result<()> {
        let note = note.clone();
        self.db
            .run(move |db| {
                let tx = db.transaction()?;
                upsert_note(&tx, note)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| {
                tracing::error!("Saving note failed: {}", e);
                e.into_transaction_failure()
            })
    }

    /// Remove one note; a missing id is not an error
    pub async fn delete_one(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .run(move |db| {
                let removed = db.conn().execute("DELETE FROM notes WHERE id = ?1", [&id])?;
                tracing::debug!("Deleted note {} ({} row)", id, removed);
                Ok(())
            })
            .await
            .map_err(|e| {
                tracing::error!("Deleting note failed: {}", e);
                e.into_transaction_failure()
            })
    }

    /// Copy the legacy flat list into the database, once.
    ///
    /// Safe to call on every startup. The flag is only set after the records
    /// are committed, so a failed run is retried next time. Entries that do
    /// not decode are never dropped: they are kept verbatim under
    /// [`QUARANTINE_KEY`], written together with the flag, before the
    /// legacy list is purged.
    pub async fn migrate_legacy_to_store(&self) -> Result<MigrationOutcome> {
        if self.prefs.get(MIGRATION_FLAG_KEY)?.as_deref() == Some("true") {
            return Ok(MigrationOutcome::AlreadyMigrated);
        }

        let entries = self.read_legacy_entries()?;
        if entries.is_empty() {
            self.prefs.set(MIGRATION_FLAG_KEY, "true")?;
            tracing::info!("No legacy notes to migrate");
            return Ok(MigrationOutcome::NoLegacyData);
        }

        let mut notes = Vec::with_capacity(entries.len());
        let mut rejected = Vec::new();
        for entry in entries {
            match decode_legacy_entry(&entry) {
                Ok(note) => notes.push(note),
                Err(e) => {
                    tracing::warn!("Quarantining undecodable legacy note: {}", e);
                    rejected.push(entry);
                }
            }
        }

        let count = notes.len();
        let quarantined = rejected.len();
        self.db
            .run(move |db| {
                let tx = db.transaction()?;
                for note in notes {
                    upsert_note(&tx, note)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| {
                tracing::error!("Legacy migration failed, will retry on next start: {}", e);
                e.into_transaction_failure()
            })?;

        if rejected.is_empty() {
            self.prefs.set(MIGRATION_FLAG_KEY, "true")?;
        } else {
            let mut held = self.read_quarantine()?;
            held.extend(rejected);
            let raw = serde_json::to_string(&held)?;
            self.prefs
                .set_many(&[(QUARANTINE_KEY, raw.as_str()), (MIGRATION_FLAG_KEY, "true")])
                .map_err(|e| {
                    tracing::error!(
                        "Could not quarantine {} legacy notes, legacy list kept: {}",
                        quarantined,
                        e
                    );
                    e
                })?;
        }

        if let Err(e) = self.prefs.remove(LEGACY_NOTES_KEY) {
            tracing::warn!("Migrated notes but could not purge legacy list: {}", e);
        }
        tracing::info!(
            "Migrated {} legacy notes into the note database ({} quarantined)",
            count,
            quarantined
        );
        Ok(MigrationOutcome::Migrated { count, quarantined })
    }

    /// Raw legacy entries the migration could not decode
    pub fn quarantined_entries(&self) -> Result<Vec<serde_json::Value>> {
        self.read_quarantine()
    }

    /// Bytes used by the database and preference store. Zeros when the
    /// database cannot be opened.
    pub async fn estimate_usage(&self) -> StorageEstimate {
        let db_bytes = match self.db.run(|db| db.used_bytes()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Usage estimate unavailable: {}", e);
                return StorageEstimate::default();
            }
        };
        let prefs_bytes = self.prefs.used_bytes().unwrap_or(0);
        StorageEstimate {
            used: db_bytes + prefs_bytes,
            quota: self.quota_bytes.unwrap_or(0),
        }
    }

    fn read_legacy_entries(&self) -> Result<Vec<serde_json::Value>> {
        match self.prefs.get(LEGACY_NOTES_KEY)? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(Vec::new()),
        }
    }

    fn read_quarantine(&self) -> Result<Vec<serde_json::Value>> {
        match self.prefs.get(QUARANTINE_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Read fallback only: undecodable entries are skipped, not removed
    fn load_legacy(&self) -> Result<Vec<Note>> {
        Ok(self
            .read_legacy_entries()?
            .iter()
            .filter_map(|entry| {
                decode_legacy_entry(entry)
                    .map_err(|e| tracing::warn!("Skipping legacy note: {}", e))
                    .ok()
            })
            .collect())
    }
}

fn decode_legacy_entry(entry: &serde_json::Value) -> Result<Note> {
    let record = StorageRecord::deserialize(entry)?;
    Note::try_from(record)
}

fn encode_all(notes: &[Note]) -> Result<Vec<(StorageRecord, String)>> {
    notes
        .iter()
        .map(|note| {
            let record = StorageRecord::from(note);
            let raw = serde_json::to_string(&record)?;
            Ok((record, raw))
        })
        .collect()
}

fn decode_row(id: &str, raw: &str) -> Option<Note> {
    serde_json::from_str::<StorageRecord>(raw)
        .map_err(Error::from)
        .and_then(Note::try_from)
        .map_err(|e| tracing::warn!("Skipping undecodable note {}: {}", id, e))
        .ok()
}

fn read_all(db: &Database) -> Result<Vec<Note>> {
    let mut stmt = db
        .conn()
        .prepare("SELECT id, record FROM notes ORDER BY position, id")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut notes = Vec::new();
    for row in rows {
        let (id, raw) = row?;
        if let Some(note) = decode_row(&id, &raw) {
            notes.push(note);
        }
    }
    Ok(notes)
}

fn insert_record(tx: &Transaction<'_>, record: &StorageRecord, raw: &str, position: i64) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO notes (id, position, created_at, updated_at, folder_id, note_type, record)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            position = excluded.position,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            folder_id = excluded.folder_id,
            note_type = excluded.note_type,
            record = excluded.record
        "#,
        params![
            record.id,
            position,
            record.created_at,
            record.updated_at,
            record.folder_id,
            record.note_type.as_ref().map(|t| t.as_str()),
            raw,
        ],
    )?;
    Ok(())
}

fn upsert_note(tx: &Transaction<'_>, mut note: Note) -> Result<()> {
    let existing: Option<(i64, String)> = tx
        .query_row(
            "SELECT position, updated_at FROM notes WHERE id = ?1",
            [&note.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let position = match existing {
        Some((position, stored_updated_at)) => {
            let stored = timestamp::decode(&stored_updated_at)?;
            if note.updated_at < stored {
                tracing::debug!(
                    "Note {} arrived with an older updated_at, keeping stored {}",
                    note.id,
                    stored_updated_at
                );
                note.updated_at = stored;
            }
            position
        }
        None => tx.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM notes",
            [],
            |row| row.get(0),
        )?,
    };

    let record = StorageRecord::from(&note);
    let raw = serde_json::to_string(&record)?;
    insert_record(tx, &record, &raw, position)
}

#[async_trait::async_trait]
impl crate::write_scheduler::SnapshotSink for RecordStore {
    async fn persist(&self, notes: Vec<Note>) -> Result<()> {
        self.save_all(&notes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_chunk_examples() {
        assert!(chunk_content("", 3).is_empty());
        assert_eq!(chunk_content("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(chunk_content("abcdef", 3), vec!["abc", "def"]);
        assert_eq!(chunk_content("ab", 0), vec!["ab"]);
        // characters, not bytes
        assert_eq!(chunk_content("héllo", 2), vec!["hé", "ll", "o"]);
    }

    #[test]
    fn test_store_chunks_with_configured_size() {
        let prefs = Arc::new(crate::kv_store::MemoryKeyValueStore::new());
        let store = RecordStore::new(DatabaseHandle::new("unused.db"), prefs);
        assert_eq!(store.chunk_size(), DEFAULT_CHUNK_SIZE);

        let store = store.with_chunk_size(4);
        assert_eq!(store.chunk("abcdefghij"), vec!["abcd", "efgh", "ij"]);
        assert_eq!(store.with_chunk_size(0).chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    proptest! {
        #[test]
        fn prop_chunks_rejoin_and_are_bounded(content in ".{0,200}", size in 1usize..50) {
            let chunks = chunk_content(&content, size);
            prop_assert_eq!(chunks.concat(), content.clone());
            if let Some((last, rest)) = chunks.split_last() {
                for chunk in rest {
                    prop_assert_eq!(chunk.chars().count(), size);
                }
                prop_assert!(last.chars().count() >= 1 && last.chars().count() <= size);
            }
        }
    }
}
