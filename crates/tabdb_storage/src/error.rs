//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Opening the database failed or timed out.
    #[error("connection error: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
    },

    /// A read against the engine failed.
    #[error("read error for key '{key}': {message}")]
    Read {
        /// The key being read.
        key: String,
        /// Description of the failure.
        message: String,
    },

    /// A write against the engine failed.
    #[error("write error for key '{key}': {message}")]
    Write {
        /// The key being written.
        key: String,
        /// Description of the failure.
        message: String,
    },

    /// The named object store does not exist in the database.
    #[error("object store not found: {0}")]
    StoreNotFound(String),

    /// The connection has been closed.
    #[error("connection is closed")]
    Closed,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Persisted data could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a read error.
    pub fn read(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Read {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a write error.
    pub fn write(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Write {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error came from opening the database.
    pub fn is_connection(&self) -> bool {
        matches!(self, StorageError::Connection { .. })
    }

    /// Returns true if the error means the handle must be reopened.
    pub fn needs_reconnect(&self) -> bool {
        matches!(self, StorageError::Connection { .. } | StorageError::Closed)
    }
}
