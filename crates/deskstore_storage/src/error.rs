//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The persisted data is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// A write would grow the store past its configured limit.
    #[error("storage quota exceeded: {requested} bytes requested, limit is {limit} bytes")]
    QuotaExceeded {
        /// Size the store would have after the write.
        requested: u64,
        /// Configured maximum size.
        limit: u64,
    },

    /// Another process holds the store's lock.
    #[error("storage locked: another process has exclusive access")]
    Locked,

    /// The backend has not been opened, or was closed.
    #[error("storage is closed")]
    Closed,

    /// A batch referenced a table that does not exist.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Encoding or decoding a persisted frame failed.
    #[error("codec error: {0}")]
    Codec(String),
}

impl StorageError {
    /// Returns true if this error reports an exhausted quota.
    #[must_use]
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}
