//! Cross-instance synchronization.
//!
//! Every local mutation is posted on a named broadcast channel right after it
//! reaches the cache. Messages from other instances are applied by a listener
//! task owned by the store. Changes are last-writer-wins: nothing is merged.

use crate::event::ChangeEvent;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tabdb_channel::{BroadcastChannel, ChangeSource, ChannelReceiver, SyncMessage};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outbound side of synchronization plus the handle of the inbound listener.
pub struct TabSync {
    channel: Option<Arc<dyn BroadcastChannel>>,
    tab_id: String,
    paused: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl TabSync {
    /// Creates a synchronizer. With no channel, synchronization is disabled.
    pub fn new(channel: Option<Arc<dyn BroadcastChannel>>) -> Self {
        Self {
            channel,
            tab_id: Uuid::new_v4().to_string(),
            paused: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    /// Identifier stamped as `origin` on outbound messages.
    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    /// Returns true if a channel is attached.
    pub fn is_enabled(&self) -> bool {
        self.channel.is_some()
    }

    /// Stops outbound broadcasts. Local events and persistence are unaffected.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resumes outbound broadcasts.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Returns true while outbound broadcasts are paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Builds the wire message for a local change.
    pub fn to_message(&self, event: &ChangeEvent) -> SyncMessage {
        SyncMessage {
            path: event.path.segments().to_vec(),
            value: event.value.clone(),
            previous_value: event.previous_value.clone(),
            timestamp: event.timestamp,
            source: ChangeSource::Local,
            origin: self.tab_id.clone(),
        }
    }

    /// Posts a local change. Returns true if a message was sent.
    ///
    /// Remote events, a paused synchronizer, or a missing channel send
    /// nothing. Post failures are logged.
    pub fn broadcast(&self, event: &ChangeEvent) -> bool {
        if event.source != ChangeSource::Local || self.is_paused() {
            return false;
        }
        let Some(channel) = &self.channel else {
            return false;
        };

        match channel.post(&self.to_message(event)) {
            Ok(()) => true,
            Err(e) => {
                warn!(channel = channel.name(), path = %event.path, error = %e, "sync broadcast failed");
                false
            }
        }
    }

    /// Returns true if the message was posted by another instance.
    pub fn is_foreign(&self, message: &SyncMessage) -> bool {
        message.origin != self.tab_id
    }

    /// Opens a receiver on the channel.
    pub fn subscribe(&self) -> Option<ChannelReceiver> {
        self.channel.as_ref().map(|channel| channel.subscribe())
    }

    /// Installs the listener task, aborting any previous one.
    pub(crate) fn set_listener(&self, handle: JoinHandle<()>) {
        if let Some(previous) = self.listener.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Returns true while a listener task is installed and running.
    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Aborts the listener task.
    pub fn stop(&self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
            debug!(tab = %self.tab_id, "sync listener stopped");
        }
    }
}

impl Drop for TabSync {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TabSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabSync")
            .field("channel", &self.channel.as_ref().map(|c| c.name().to_string()))
            .field("tab_id", &self.tab_id)
            .field("paused", &self.is_paused())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::DocPath;
    use serde_json::json;
    use tabdb_channel::LocalBroadcastHub;

    fn event(source: ChangeSource) -> ChangeEvent {
        ChangeEvent {
            path: DocPath::parse("projects.active"),
            value: Some(json!("p1")),
            previous_value: Some(json!(null)),
            timestamp: 7,
            source,
        }
    }

    fn sync_on(hub: &LocalBroadcastHub) -> TabSync {
        TabSync::new(Some(Arc::new(hub.channel("test"))))
    }

    #[test]
    fn tab_ids_are_unique() {
        assert_ne!(TabSync::new(None).tab_id(), TabSync::new(None).tab_id());
    }

    #[test]
    fn message_carries_origin_and_values() {
        let sync = TabSync::new(None);
        let message = sync.to_message(&event(ChangeSource::Local));
        assert_eq!(message.path, vec!["projects", "active"]);
        assert_eq!(message.value, Some(json!("p1")));
        assert_eq!(message.previous_value, Some(json!(null)));
        assert_eq!(message.origin, sync.tab_id());
        assert!(!sync.is_foreign(&message));
    }

    #[tokio::test]
    async fn local_events_are_broadcast() {
        let hub = LocalBroadcastHub::new();
        let sender = sync_on(&hub);
        let receiver = sync_on(&hub);
        let mut rx = receiver.subscribe().unwrap();

        assert!(sender.broadcast(&event(ChangeSource::Local)));
        let message = rx.recv().await.unwrap();
        assert!(receiver.is_foreign(&message));
        assert_eq!(message.joined_path(), "projects.active");
    }

    #[tokio::test]
    async fn remote_events_and_paused_sync_send_nothing() {
        let hub = LocalBroadcastHub::new();
        let sync = sync_on(&hub);
        let mut rx = sync.subscribe().unwrap();

        assert!(!sync.broadcast(&event(ChangeSource::Remote)));
        sync.pause();
        assert!(!sync.broadcast(&event(ChangeSource::Local)));
        assert!(rx.try_recv().is_none());

        sync.resume();
        assert!(sync.broadcast(&event(ChangeSource::Local)));
        assert!(rx.try_recv().is_some());
    }

    #[test]
    fn disabled_without_channel() {
        let sync = TabSync::new(None);
        assert!(!sync.is_enabled());
        assert!(sync.subscribe().is_none());
        assert!(!sync.broadcast(&event(ChangeSource::Local)));
    }

    #[tokio::test]
    async fn stop_aborts_listener() {
        let sync = TabSync::new(None);
        sync.set_listener(tokio::spawn(std::future::pending::<()>()));
        assert!(sync.is_listening());
        sync.stop();
        assert!(!sync.is_listening());
    }
}
