//! Database connection and initialization

use crate::{migrations, Error, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Database connection wrapper
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    /// Open (creating if needed) and migrate.
    ///
    /// The parent directory must already exist; a missing directory or an
    /// unreadable file is reported as [`Error::BackendUnavailable`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();

        let conn = Connection::open_with_flags(
            &path_buf,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            Error::BackendUnavailable(format!("cannot open {}: {}", path_buf.display(), e))
        })?;

        // journal_mode returns a row, so it goes through query_row
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| Error::BackendUnavailable(format!("not a usable database: {}", e)))?;
        tracing::debug!("Opened {} (journal_mode={})", path_buf.display(), journal_mode);

        migrations::run_migrations(&conn)
            .map_err(|e| Error::BackendUnavailable(format!("migration failed: {}", e)))?;

        Ok(Self {
            conn,
            path: path_buf,
        })
    }

    /// Get connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin transaction
    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// File backing this database
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes held by allocated pages (excludes free pages)
    pub fn used_bytes(&self) -> Result<u64> {
        let (page_count, freelist, page_size): (i64, i64, i64) = self.conn.query_row(
            "SELECT page_count, freelist_count, page_size \
             FROM pragma_page_count(), pragma_freelist_count(), pragma_page_size()",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(((page_count - freelist).max(0) * page_size) as u64)
    }
}

/// Lazily opened, explicitly owned database handle.
///
/// The first successful [`DatabaseHandle::get`] opens the file and caches the
/// connection for the lifetime of the handle; later calls reuse it. A failed
/// open is not cached, so the next call tries again. Clones share the same
/// connection.
#[derive(Clone)]
pub struct DatabaseHandle {
    path: PathBuf,
    cell: Arc<OnceCell<Arc<Mutex<Database>>>>,
}

impl DatabaseHandle {
    /// Handle for the database at `path`; nothing is opened yet
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Target path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the database has been opened
    pub fn is_open(&self) -> bool {
        self.cell.initialized()
    }

    /// Open on first use, then return the shared connection
    pub async fn get(&self) -> Result<Arc<Mutex<Database>>> {
        let db = self
            .cell
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let db = tokio::task::spawn_blocking(move || Database::open(path))
                    .await
                    .map_err(|e| Error::BackendUnavailable(e.to_string()))??;
                tracing::info!("Note database ready at {}", self.path.display());
                Ok::<_, Error>(Arc::new(Mutex::new(db)))
            })
            .await?;
        Ok(Arc::clone(db))
    }

    /// Run `f` against the connection on the blocking pool.
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.get().await?;
        tokio::task::spawn_blocking(move || {
            let mut guard = db.lock();
            f(&mut guard)
        })
        .await?
    }
}
