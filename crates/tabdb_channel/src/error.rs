//! Error types for the broadcast channel.

use thiserror::Error;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur when posting or receiving sync messages.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel has been closed locally.
    #[error("channel '{0}' is closed")]
    Closed(String),

    /// A message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
