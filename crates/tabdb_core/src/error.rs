//! Error types for TabDB core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in TabDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Backend error (connection, read or write), after retries.
    #[error("storage error: {0}")]
    Storage(#[from] tabdb_storage::StorageError),

    /// Broadcast channel error.
    #[error("channel error: {0}")]
    Channel(#[from] tabdb_channel::ChannelError),

    /// The persisted document is corrupt or from an incompatible version, or
    /// a value could not be converted to or from JSON.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the problem.
        message: String,
    },

    /// A restore payload failed validation.
    #[error("invalid import: {message}")]
    ImportValidation {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted on the given path or in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,
}

impl CoreError {
    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates an import validation error.
    pub fn import_validation(message: impl Into<String>) -> Self {
        Self::ImportValidation {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if the error came from opening the backend.
    pub fn is_connection(&self) -> bool {
        matches!(self, CoreError::Storage(e) if e.is_connection())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}
