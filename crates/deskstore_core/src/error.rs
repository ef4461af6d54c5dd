//! Error types for DeskStore core.

use deskstore_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in DeskStore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The database could not be opened or upgraded, or is not open.
    #[error("database unavailable: {message}")]
    DatabaseUnavailable {
        /// Why the database is unavailable.
        message: String,
    },

    /// `add` found an existing record with the same primary key.
    #[error("duplicate key {key} in collection {collection}")]
    DuplicateKey {
        /// Collection name.
        collection: String,
        /// The conflicting key.
        key: String,
    },

    /// A required collection, index or record does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What was looked up ("collection", "index", "record").
        kind: &'static str,
        /// Name or key that was not found.
        name: String,
    },

    /// A transaction failed and was rolled back.
    #[error("transaction aborted: {reason}")]
    Transaction {
        /// Reason for the abort.
        reason: String,
        /// The failure that caused the abort, if any.
        #[source]
        source: Option<Box<CoreError>>,
    },

    /// A snapshot failed structural validation.
    #[error("invalid backup format: {message}")]
    InvalidBackupFormat {
        /// Description of the problem.
        message: String,
    },

    /// The backend rejected a write because it ran out of space.
    #[error("storage quota exceeded: {message}")]
    QuotaExceeded {
        /// Message reported by the backend.
        message: String,
    },

    /// A record or key value is not acceptable.
    #[error("invalid key in collection {collection}: {message}")]
    InvalidKey {
        /// Collection name.
        collection: String,
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        if err.is_quota_exceeded() {
            Self::QuotaExceeded {
                message: err.to_string(),
            }
        } else {
            Self::Storage(err)
        }
    }
}

impl CoreError {
    /// Creates a database unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::DatabaseUnavailable {
            message: message.into(),
        }
    }

    /// Creates a collection not found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "collection",
            name: name.into(),
        }
    }

    /// Creates an index not found error.
    pub fn index_not_found(collection: &str, index: &str) -> Self {
        Self::NotFound {
            kind: "index",
            name: format!("{collection}.{index}"),
        }
    }

    /// Creates a record not found error.
    pub fn record_not_found(collection: &str, key: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind: "record",
            name: format!("{collection}/{key}"),
        }
    }

    /// Wraps the failure that aborted a transaction.
    pub fn transaction_failed(cause: CoreError) -> Self {
        Self::Transaction {
            reason: cause.to_string(),
            source: Some(Box::new(cause)),
        }
    }

    /// Creates an invalid backup format error.
    pub fn invalid_backup(message: impl Into<String>) -> Self {
        Self::InvalidBackupFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid key error.
    pub fn invalid_key(collection: &str, message: impl Into<String>) -> Self {
        Self::InvalidKey {
            collection: collection.to_string(),
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a corruption error for persisted data the engine cannot read.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Storage(StorageError::Corrupted(message.into()))
    }

    /// Returns the error that aborted a transaction, if this is one.
    #[must_use]
    pub fn transaction_cause(&self) -> Option<&CoreError> {
        match self {
            Self::Transaction {
                source: Some(cause),
                ..
            } => Some(cause),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_storage_error_maps_to_quota_exceeded() {
        let err: CoreError = StorageError::QuotaExceeded {
            requested: 10,
            limit: 5,
        }
        .into();
        assert!(matches!(
            err,
            CoreError::QuotaExceeded { message } if message.contains("10 bytes")
        ));
    }

    #[test]
    fn other_storage_errors_stay_storage() {
        let err: CoreError = StorageError::Closed.into();
        assert!(matches!(err, CoreError::Storage(StorageError::Closed)));
    }

    #[test]
    fn transaction_keeps_cause() {
        let err = CoreError::transaction_failed(CoreError::DuplicateKey {
            collection: "users".into(),
            key: "1".into(),
        });
        assert!(matches!(
            err.transaction_cause(),
            Some(CoreError::DuplicateKey { .. })
        ));
        assert!(err.to_string().contains("duplicate key 1"));
    }
}
