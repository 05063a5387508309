//! Database schema migrations

use crate::Result;
use rusqlite::Connection;

const SCHEMA_VERSION: i32 = 2;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    tracing::debug!(
        "Running migrations: current_version={}, target_version={}",
        current_version,
        SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    if current_version != SCHEMA_VERSION {
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Current schema version, 0 for a fresh database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    let result = conn.query_row(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    );

    match result {
        Ok(v) => Ok(v),
        Err(_) => Ok(0),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    tracing::debug!("Schema version set to {}", version);
    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            folder_id TEXT,
            note_type TEXT,
            record TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notes_created_at ON notes(created_at);
        CREATE INDEX IF NOT EXISTS idx_notes_updated_at ON notes(updated_at);
        CREATE INDEX IF NOT EXISTS idx_notes_folder_id ON notes(folder_id);
        CREATE INDEX IF NOT EXISTS idx_notes_note_type ON notes(note_type);
        "#,
    )?;
    Ok(())
}

/// Collection order. Existing rows keep creation order.
fn migrate_v2(conn: &Connection) -> Result<()> {
    let has_position: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('notes') WHERE name = 'position'",
        [],
        |row| row.get(0),
    )?;
    if !has_position {
        conn.execute_batch(
            r#"
            ALTER TABLE notes ADD COLUMN position INTEGER NOT NULL DEFAULT 0;
            UPDATE notes SET position = (
                SELECT COUNT(*) FROM notes AS earlier
                WHERE earlier.created_at < notes.created_at
                   OR (earlier.created_at = notes.created_at AND earlier.id < notes.id)
            );
            "#,
        )?;
    }
    conn.execute_batch("CREATE INDEX IF NOT EXISTS idx_notes_position ON notes(position);")?;
    Ok(())
}
