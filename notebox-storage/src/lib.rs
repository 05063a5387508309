//! Local persistence and access control for Notebox
//!
//! Stores notes on-device in an indexed SQLite database, migrates notes left
//! in the old flat preference list, debounces bursts of edits into single
//! writes, and gates protected notes behind a password and/or biometrics.
//!
//! ## Components
//!
//! - **Record Store**: WAL-mode SQLite with indexes on creation time, update
//!   time, folder and type; legacy read fallback and one-shot migration
//! - **Write Scheduler**: 500 ms debounce, latest snapshot wins
//! - **Credential hashing**: PBKDF2-HMAC-SHA256, 100,000 iterations, 16-byte
//!   hex salt; unsalted legacy hashes still verify
//! - **Protection Manager**: per-note and hidden-notes scopes, biometric
//!   first, password fallback, security-question recovery
//!
//! Note content is stored in clear. Protection is an access gate for the UI,
//! not encryption at rest.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod biometric;
pub mod config;
pub mod credentials;
pub mod database;
pub mod error;
pub mod kv_store;
pub mod migrations;
pub mod models;
pub mod protection;
pub mod record_store;
pub mod security;
pub mod vault;
pub mod write_scheduler;

pub use biometric::{
    fallback_gate, BiometricAvailability, BiometricGate, BiometricOutcome, BiometricType,
    MockBiometricGate, Platform, UnsupportedBiometricGate,
};
pub use config::StorageConfig;
pub use credentials::{CredentialRecord, CredentialStore, ProtectionScope, SecurityQuestion};
pub use database::{Database, DatabaseHandle};
pub use error::{Error, Result};
pub use kv_store::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
pub use models::*;
pub use protection::{default_localizer, Localizer, ProtectionManager, ProtectionState};
pub use record_store::{chunk_content, RecordStore, DEFAULT_CHUNK_SIZE};
pub use security::{
    derive_hash, generate_salt, legacy_hash, verify, DerivedHash, KeyDerivation,
    PBKDF2_ITERATIONS,
};
pub use vault::NoteVault;
pub use write_scheduler::{SnapshotSink, WriteScheduler};
