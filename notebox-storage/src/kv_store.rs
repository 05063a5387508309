//! Simple preference store
//!
//! String keys to string values with a byte capacity. Credentials, flags and
//! the legacy flat note list all live here. Batch operations are atomic: a
//! reader never observes half of a batch.

use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

/// Key-value store abstraction
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write several entries atomically
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()>;

    /// Remove several keys atomically; absent keys are ignored
    fn remove_many(&self, keys: &[&str]) -> Result<()>;

    /// Bytes currently held (keys plus values)
    fn used_bytes(&self) -> Result<u64>;

    /// Write a value
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_many(&[(key, value)])
    }

    /// Remove a key
    fn remove(&self, key: &str) -> Result<()> {
        self.remove_many(&[key])
    }
}

fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

fn check_capacity(requested: u64, capacity: Option<u64>) -> Result<()> {
    match capacity {
        Some(capacity) if requested > capacity => {
            tracing::warn!(
                "Preference store quota exceeded: {} > {} bytes",
                requested,
                capacity
            );
            Err(Error::QuotaExceeded {
                requested,
                capacity,
            })
        }
        _ => Ok(()),
    }
}

/// SQLite-file preference store
pub struct SqliteKeyValueStore {
    conn: Mutex<Connection>,
    capacity: Option<u64>,
}

impl SqliteKeyValueStore {
    /// Open (creating if needed)
    pub fn open<P: AsRef<Path>>(path: P, capacity: Option<u64>) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::init(conn, capacity)
    }

    /// In-memory instance (tests, ephemeral sessions)
    pub fn open_in_memory(capacity: Option<u64>) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, capacity)
    }

    fn init(conn: Connection, capacity: Option<u64>) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL)",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            capacity,
        })
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?)
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        let used: i64 = tx.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0) FROM kv",
            [],
            |row| row.get(0),
        )?;
        // Dropping the transaction rolls the batch back
        check_capacity(used as u64, self.capacity)?;
        tx.commit()?;
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for key in keys {
            tx.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn used_bytes(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let used: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0) FROM kv",
            [],
            |row| row.get(0),
        )?;
        Ok(used as u64)
    }
}

/// In-memory preference store
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
    capacity: Option<u64>,
}

impl MemoryKeyValueStore {
    /// Unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes past `capacity` bytes
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: Some(capacity),
        }
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set_many(&self, batch: &[(&str, &str)]) -> Result<()> {
        let mut entries = self.entries.write();
        let mut staged = entries.clone();
        for (key, value) in batch {
            staged.insert(key.to_string(), value.to_string());
        }
        let used = staged.iter().map(|(k, v)| entry_size(k, v)).sum();
        check_capacity(used, self.capacity)?;
        *entries = staged;
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut entries = self.entries.write();
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }

    fn used_bytes(&self) -> Result<u64> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(k, v)| entry_size(k, v))
            .sum())
    }
}
