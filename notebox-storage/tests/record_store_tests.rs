//! Record store tests
//!
//! Tests cover:
//! - Round trip of every note field through the note database
//! - Replace semantics of bulk saves, order preservation and rollback
//! - Single-note upsert and delete
//! - Legacy read fallback when the database cannot be opened
//! - Usage estimates

use chrono::{Duration as ChronoDuration, Utc};
use notebox_storage::record_store::{LEGACY_NOTES_KEY, MIGRATION_FLAG_KEY};
use notebox_storage::{
    DatabaseHandle, Error, KeyValueStore, MemoryKeyValueStore, Note, NoteType, RecordStore,
    StorageRecord,
};
use std::sync::Arc;
use tempfile::TempDir;

fn store_in(dir: &TempDir) -> (RecordStore, Arc<MemoryKeyValueStore>) {
    let prefs = Arc::new(MemoryKeyValueStore::new());
    let store = RecordStore::new(DatabaseHandle::new(dir.path().join("notes.db")), prefs.clone());
    (store, prefs)
}

fn unavailable_store(dir: &TempDir) -> (RecordStore, Arc<MemoryKeyValueStore>) {
    let prefs = Arc::new(MemoryKeyValueStore::new());
    let path = dir.path().join("missing").join("notes.db");
    let store = RecordStore::new(DatabaseHandle::new(path), prefs.clone());
    (store, prefs)
}

fn write_legacy(prefs: &MemoryKeyValueStore, notes: &[Note]) {
    let records: Vec<StorageRecord> = notes.iter().map(StorageRecord::from).collect();
    prefs
        .set(LEGACY_NOTES_KEY, &serde_json::to_string(&records).unwrap())
        .unwrap();
}

// =============================================================================
// Round trip
// =============================================================================

#[tokio::test]
async fn test_round_trip_preserves_every_field() {
    let dir = TempDir::new().unwrap();
    let (store, _) = store_in(&dir);

    let mut note = Note::new("<p>groceries</p>")
        .with_title("Shopping")
        .with_type(NoteType::Lined)
        .with_folder("f1");
    note.color = Some("#ffcc00".to_string());
    note.reminder_time = Some(Utc::now() + ChronoDuration::hours(3));
    note.archived_at = Some(Utc::now());
    note.add_voice_recording("data:audio/webm;base64,AAAA");
    note.add_voice_recording("file://rec2.webm");

    let plain = Note::new("second").with_type(NoteType::Other("kanban".to_string()));

    store.save_all(&[note.clone(), plain.clone()]).await.unwrap();
    let loaded = store.load_all().await;

    assert_eq!(loaded, vec![note, plain]);
    assert_eq!(loaded[0].voice_recordings.len(), 2);
    assert!(loaded[0].is_archived());
    assert!(!loaded[0].is_deleted());
}

#[tokio::test]
async fn test_empty_database_loads_empty() {
    let dir = TempDir::new().unwrap();
    let (store, _) = store_in(&dir);

    assert!(store.load_all().await.is_empty());
    assert_eq!(store.note_count().await.unwrap(), 0);
    assert!(store.handle().is_open());
}

#[tokio::test]
async fn test_database_is_opened_lazily() {
    let dir = TempDir::new().unwrap();
    let (store, _) = store_in(&dir);

    assert!(!store.handle().is_open());
    assert!(!dir.path().join("notes.db").exists());

    store.save_all(&[Note::new("x")]).await.unwrap();
    assert!(store.handle().is_open());
    assert!(dir.path().join("notes.db").exists());
}

#[tokio::test]
async fn test_notes_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let note = Note::new("persisted");
    {
        let (store, _) = store_in(&dir);
        store.save_all(&[note.clone()]).await.unwrap();
    }

    let (store, _) = store_in(&dir);
    assert_eq!(store.load_all().await, vec![note]);
}

// =============================================================================
// Bulk save
// =============================================================================

#[tokio::test]
async fn test_save_all_replaces_collection() {
    let dir = TempDir::new().unwrap();
    let (store, _) = store_in(&dir);

    let a = Note::new("a");
    let b = Note::new("b");
    let c = Note::new("c");
    store.save_all(&[a.clone(), b.clone()]).await.unwrap();
    store.save_all(&[c.clone(), a.clone()]).await.unwrap();

    // b is gone; order follows the last save, not creation time
    assert_eq!(store.load_all().await, vec![c, a]);
}

#[tokio::test]
async fn test_save_all_empty_clears_store() {
    let dir = TempDir::new().unwrap();
    let (store, _) = store_in(&dir);

    store.save_all(&[Note::new("a"), Note::new("b")]).await.unwrap();
    store.save_all(&[]).await.unwrap();

    assert!(store.load_all().await.is_empty());
}

#[tokio::test]
async fn test_save_all_with_duplicate_ids_keeps_last() {
    let dir = TempDir::new().unwrap();
    let (store, _) = store_in(&dir);

    let first = Note::new("first");
    let mut second = first.clone();
    second.content = "second".to_string();

    store.save_all(&[first, second.clone()]).await.unwrap();

    assert_eq!(store.load_all().await, vec![second]);
}

#[tokio::test]
async fn test_failed_save_all_keeps_last_committed_state() {
    let dir = TempDir::new().unwrap();
    let (store, _) = store_in(&dir);

    let a = Note::new("a");
    let b = Note::new("b");
    store.save_all(&[a.clone(), b.clone()]).await.unwrap();

    store
        .handle()
        .run(|db| {
            db.conn().execute_batch(
                "CREATE TRIGGER reject_boom BEFORE INSERT ON notes \
                 WHEN NEW.id = 'boom' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )?;
            Ok(())
        })
        .await
        .unwrap();

    let mut boom = Note::new("boom");
    boom.id = "boom".to_string();
    let result = store.save_all(&[Note::new("c"), boom]).await;

    assert!(matches!(result, Err(Error::Transaction(_))));
    assert_eq!(store.load_all().await, vec![a, b]);
}

#[tokio::test]
async fn test_save_all_never_writes_legacy_list() {
    let dir = TempDir::new().unwrap();
    let (store, prefs) = unavailable_store(&dir);

    let result = store.save_all(&[Note::new("lost")]).await;

    assert!(matches!(result, Err(Error::BackendUnavailable(_))));
    assert!(prefs.get(LEGACY_NOTES_KEY).unwrap().is_none());
    assert!(prefs.is_empty());
}

// =============================================================================
// Single-note operations
// =============================================================================

#[tokio::test]
async fn test_save_one_updates_in_place() {
    let dir = TempDir::new().unwrap();
    let (store, _) = store_in(&dir);

    let a = Note::new("a");
    let b = Note::new("b");
    store.save_all(&[a.clone(), b.clone()]).await.unwrap();

    let mut edited = a.clone();
    edited.content = "a, edited".to_string();
    edited.touch();
    store.save_one(&edited).await.unwrap();

    let c = Note::new("c");
    store.save_one(&c).await.unwrap();

    // edited note keeps its slot; the new one is appended
    assert_eq!(store.load_all().await, vec![edited, b, c]);
}

#[tokio::test]
async fn test_save_one_never_moves_updated_at_backwards() {
    let dir = TempDir::new().unwrap();
    let (store, _) = store_in(&dir);

    let note = Note::new("v2");
    store.save_one(&note).await.unwrap();

    let mut stale = note.clone();
    stale.content = "v1".to_string();
    stale.updated_at = note.updated_at - ChronoDuration::minutes(5);
    store.save_one(&stale).await.unwrap();

    let loaded = store.load_all().await;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].content, "v1");
    assert_eq!(loaded[0].updated_at, note.updated_at);
}

#[tokio::test]
async fn test_delete_one() {
    let dir = TempDir::new().unwrap();
    let (store, _) = store_in(&dir);

    let a = Note::new("a");
    let b = Note::new("b");
    store.save_all(&[a.clone(), b.clone()]).await.unwrap();

    store.delete_one(&a.id).await.unwrap();
    assert_eq!(store.load_all().await, vec![b]);

    // unknown id is not an error
    store.delete_one("no-such-note").await.unwrap();
    assert_eq!(store.note_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_load_by_folder() {
    let dir = TempDir::new().unwrap();
    let (store, _) = store_in(&dir);

    let work1 = Note::new("w1").with_folder("work");
    let home = Note::new("h").with_folder("home");
    let loose = Note::new("no folder");
    let work2 = Note::new("w2").with_folder("work");
    store
        .save_all(&[work1.clone(), home, loose, work2.clone()])
        .await
        .unwrap();

    assert_eq!(store.load_by_folder("work").await.unwrap(), vec![work1, work2]);
    assert!(store.load_by_folder("archive").await.unwrap().is_empty());
}

// =============================================================================
// Fallback
// =============================================================================

#[tokio::test]
async fn test_load_falls_back_to_legacy_when_database_unavailable() {
    let dir = TempDir::new().unwrap();
    let (store, prefs) = unavailable_store(&dir);

    let legacy = vec![Note::new("old one"), Note::new("old two")];
    write_legacy(&prefs, &legacy);

    assert_eq!(store.load_all().await, legacy);
    assert!(!store.handle().is_open());
}

#[tokio::test]
async fn test_load_ignores_legacy_when_database_available() {
    let dir = TempDir::new().unwrap();
    let (store, prefs) = store_in(&dir);

    prefs.set(MIGRATION_FLAG_KEY, "true").unwrap();
    write_legacy(&prefs, &[Note::new("stale legacy")]);
    let current = Note::new("current");
    store.save_all(&[current.clone()]).await.unwrap();

    assert_eq!(store.load_all().await, vec![current]);
}

#[tokio::test]
async fn test_unavailable_everywhere_loads_empty() {
    let dir = TempDir::new().unwrap();
    let (store, _) = unavailable_store(&dir);

    assert!(store.load_all().await.is_empty());
}

// =============================================================================
// Usage
// =============================================================================

#[tokio::test]
async fn test_estimate_usage() {
    let dir = TempDir::new().unwrap();
    let (store, _) = store_in(&dir);
    let store = store.with_quota(Some(1 << 30));

    store.save_all(&[Note::new("x".repeat(10_000))]).await.unwrap();
    let estimate = store.estimate_usage().await;

    assert!(estimate.used >= 10_000);
    assert_eq!(estimate.quota, 1 << 30);
}

#[tokio::test]
async fn test_estimate_usage_unavailable_is_zero() {
    let dir = TempDir::new().unwrap();
    let (store, _) = unavailable_store(&dir);

    let estimate = store.estimate_usage().await;
    assert_eq!(estimate.used, 0);
    assert_eq!(estimate.quota, 0);
}
