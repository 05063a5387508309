//! Error types

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored instant could not be parsed
    #[error("Timestamp error: {0}")]
    Timestamp(#[from] chrono::ParseError),

    /// Primary backend could not be opened
    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Write transaction aborted; durable state is unchanged
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Cryptographic primitive could not be invoked
    #[error("Crypto unavailable: {0}")]
    CryptoUnavailable(String),

    /// Key-value store capacity exceeded
    #[error("Quota exceeded: {requested} bytes requested, capacity {capacity} bytes")]
    QuotaExceeded {
        /// Bytes the store would hold after the write
        requested: u64,
        /// Configured capacity
        capacity: u64,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Background task failed to run to completion
    #[error("Task error: {0}")]
    Task(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Reclassify a write-path failure as a transaction failure.
    ///
    /// Backend unavailability and quota errors keep their own kind.
    pub fn into_transaction_failure(self) -> Self {
        match self {
            Error::BackendUnavailable(_)
            | Error::Transaction(_)
            | Error::QuotaExceeded { .. } => self,
            other => Error::Transaction(other.to_string()),
        }
    }

    /// True when the primary backend could not be opened
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Error::BackendUnavailable(_))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
