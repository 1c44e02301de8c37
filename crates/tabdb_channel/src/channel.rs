//! Broadcast channel abstraction.

use crate::error::ChannelResult;
use crate::message::SyncMessage;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// A named, best-effort publish/subscribe channel shared by store instances.
///
/// This trait abstracts the transport, allowing an in-process hub, a mock
/// for testing, or a socket-backed channel for multi-process deployments.
///
/// Delivery is at-most-once per receiver and carries no ordering guarantee
/// across senders. Receivers see their own posts too; consumers filter by
/// [`SyncMessage::origin`].
pub trait BroadcastChannel: Send + Sync {
    /// Returns the channel name.
    fn name(&self) -> &str;

    /// Posts a message to every current subscriber.
    ///
    /// Posting with no subscribers succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed or the message cannot be
    /// encoded.
    fn post(&self, message: &SyncMessage) -> ChannelResult<()>;

    /// Opens a receiver for messages posted after this call.
    fn subscribe(&self) -> ChannelReceiver;

    /// Closes the channel for this handle. Later posts fail.
    fn close(&self);
}

/// Receiving half of a [`BroadcastChannel`].
///
/// Messages travel as JSON text; undecodable messages are logged and
/// skipped, as are messages dropped because the receiver fell behind.
#[derive(Debug)]
pub struct ChannelReceiver {
    inner: broadcast::Receiver<String>,
}

impl ChannelReceiver {
    /// Wraps a raw receiver of encoded messages.
    pub fn new(inner: broadcast::Receiver<String>) -> Self {
        Self { inner }
    }

    /// Waits for the next decodable message.
    ///
    /// Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<SyncMessage> {
        loop {
            match self.inner.recv().await {
                Ok(text) => match SyncMessage::decode(&text) {
                    Ok(message) => return Some(message),
                    Err(e) => warn!(error = %e, "dropping undecodable sync message"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "sync receiver lagged, messages dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<SyncMessage> {
        loop {
            match self.inner.try_recv() {
                Ok(text) => match SyncMessage::decode(&text) {
                    Ok(message) => return Some(message),
                    Err(e) => warn!(error = %e, "dropping undecodable sync message"),
                },
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "sync receiver lagged, messages dropped");
                }
                Err(_) => return None,
            }
        }
    }
}
