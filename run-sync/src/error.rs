//! Error types for stride-sync.

use run_types::CodecError;
use std::path::PathBuf;

/// Main error type for sync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored run payload could not be encoded or decoded.
    #[error("run payload error: {0}")]
    Codec(#[from] CodecError),

    /// A row holds a value that does not map back to a domain type.
    #[error("corrupt {column} value in {table}")]
    Corrupt {
        /// Table containing the row.
        table: &'static str,
        /// Offending column.
        column: &'static str,
    },

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
