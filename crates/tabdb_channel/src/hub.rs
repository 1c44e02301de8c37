//! In-process broadcast hub.

use crate::channel::{BroadcastChannel, ChannelReceiver};
use crate::error::{ChannelError, ChannelResult};
use crate::message::SyncMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of undelivered messages a receiver may lag behind.
pub const DEFAULT_CAPACITY: usize = 1024;

/// An in-process registry of named broadcast channels.
///
/// Every [`LocalChannel`] obtained for the same name from clones of one hub
/// shares a single tokio broadcast queue. Synchronization through the hub is
/// limited to store instances living in the same process.
///
/// # Example
///
/// ```rust
/// use tabdb_channel::{BroadcastChannel, LocalBroadcastHub};
///
/// let hub = LocalBroadcastHub::new();
/// let a = hub.channel("tabdb-sync");
/// let b = hub.channel("tabdb-sync");
/// assert_eq!(a.name(), b.name());
/// ```
#[derive(Debug, Clone)]
pub struct LocalBroadcastHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
    capacity: usize,
}

impl LocalBroadcastHub {
    /// Creates a hub with the default per-receiver capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a hub with a specific per-receiver capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Returns a handle to the named channel, creating it if needed.
    pub fn channel(&self, name: &str) -> LocalChannel {
        let sender = self
            .channels
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone();

        LocalChannel {
            name: name.to_string(),
            sender,
            closed: AtomicBool::new(false),
        }
    }

    /// Number of named channels created so far.
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }
}

impl Default for LocalBroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One handle to a named channel of a [`LocalBroadcastHub`].
#[derive(Debug)]
pub struct LocalChannel {
    name: String,
    sender: broadcast::Sender<String>,
    closed: AtomicBool,
}

impl LocalChannel {
    /// Number of receivers currently subscribed to the channel.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl BroadcastChannel for LocalChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn post(&self, message: &SyncMessage) -> ChannelResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed(self.name.clone()));
        }
        let text = message.encode()?;
        // A send error only means nobody is listening yet
        let delivered = self.sender.send(text).unwrap_or(0);
        trace!(channel = %self.name, delivered, "posted sync message");
        Ok(())
    }

    fn subscribe(&self) -> ChannelReceiver {
        ChannelReceiver::new(self.sender.subscribe())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
