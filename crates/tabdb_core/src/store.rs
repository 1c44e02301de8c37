//! The store facade.
//!
//! [`Store`] ties the pieces together. A mutation updates the cached root
//! document synchronously, fires the event bus, is posted to other
//! instances, and is queued in the write coalescer. A debounce timer flushes
//! the queue into one backend write through the retry policy.

use crate::backup::BackupEnvelope;
use crate::cache::{CacheStats, DocumentCache};
use crate::coalescer::WriteCoalescer;
use crate::config::StoreConfig;
use crate::document::{default_document, now_millis, prune_empty, stamp_modified, validate_loaded};
use crate::error::{CoreError, CoreResult};
use crate::event::{ChangeEvent, EventBus, Handler, Subscription};
use crate::path::{get_value_at_path, remove_value_at_path, set_value_at_path, DocPath};
use crate::retry::RetryPolicy;
use crate::stats::{StatsSnapshot, StoreStats};
use crate::sync::TabSync;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tabdb_channel::{BroadcastChannel, ChangeSource, LocalBroadcastHub, SyncMessage};
use tabdb_storage::{BackendAdapter, InMemoryEngine, KvEngine};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of a flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Paths whose pending writes were persisted, in application order.
    pub paths: Vec<DocPath>,
    /// Size of the JSON document written.
    pub bytes: usize,
    /// Whether the backend was written at all.
    pub wrote: bool,
}

/// Backend and queue information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageInfo {
    /// Database name.
    pub db_name: String,
    /// Object store name.
    pub store_name: String,
    /// Engine schema version.
    pub version: u32,
    /// Keys present in the object store.
    pub keys: Vec<String>,
    /// Number of keys.
    pub key_count: usize,
    /// Approximate size of all stored values as compact JSON.
    pub approximate_bytes: usize,
    /// Writes waiting for the next flush.
    pub pending_writes: usize,
    /// Whether a backend connection is currently held.
    pub connected: bool,
}

/// Cache and coalescer share one lock so the root pin always matches the
/// queue.
struct State {
    cache: DocumentCache,
    pending: WriteCoalescer,
}

struct Inner {
    config: StoreConfig,
    backend: BackendAdapter,
    state: Mutex<State>,
    bus: EventBus,
    retry: RetryPolicy,
    sync: TabSync,
    stats: StoreStats,
    load_lock: tokio::sync::Mutex<()>,
    flush_lock: tokio::sync::Mutex<()>,
    timer: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Inner {
    fn cancel_timer(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

/// A reactive, path-addressed document store.
///
/// `Store` is a cheap handle; clones share the same instance. Every clone of
/// one store sees the same cache, subscribers and pending writes.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use tabdb_core::Store;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = Store::open_in_memory().await.unwrap();
/// store.set_path("projects.list.p1", json!({"id": "p1", "name": "Foo"})).await.unwrap();
///
/// let name: Option<String> = store.get_path("projects.list.p1.name").await.unwrap();
/// assert_eq!(name.as_deref(), Some("Foo"));
///
/// store.flush().await.unwrap();
/// # });
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    /// Creates a store without cross-instance synchronization. Nothing is
    /// loaded until [`Store::initialize`] or the first operation.
    pub fn new(engine: Arc<dyn KvEngine>, config: StoreConfig) -> Self {
        Self::build(engine, config, None)
    }

    /// Creates a store that synchronizes over `channel`.
    pub fn with_channel(
        engine: Arc<dyn KvEngine>,
        config: StoreConfig,
        channel: Arc<dyn BroadcastChannel>,
    ) -> Self {
        Self::build(engine, config, Some(channel))
    }

    /// Creates a store that synchronizes over the hub channel named by
    /// [`StoreConfig::channel_name`].
    pub fn with_hub(
        engine: Arc<dyn KvEngine>,
        config: StoreConfig,
        hub: &LocalBroadcastHub,
    ) -> Self {
        let channel = Arc::new(hub.channel(&config.channel_name));
        Self::build(engine, config, Some(channel))
    }

    fn build(
        engine: Arc<dyn KvEngine>,
        config: StoreConfig,
        channel: Option<Arc<dyn BroadcastChannel>>,
    ) -> Self {
        let backend = BackendAdapter::new(engine, config.backend.clone());
        let cache = DocumentCache::new(config.cache_ttl, config.max_cache_entries);
        let retry = RetryPolicy::new(config.retry.clone());

        Self {
            inner: Arc::new(Inner {
                backend,
                state: Mutex::new(State {
                    cache,
                    pending: WriteCoalescer::new(),
                }),
                bus: EventBus::new(),
                retry,
                sync: TabSync::new(channel),
                stats: StoreStats::new(),
                load_lock: tokio::sync::Mutex::new(()),
                flush_lock: tokio::sync::Mutex::new(()),
                timer: Mutex::new(None),
                closed: AtomicBool::new(false),
                config,
            }),
        }
    }

    /// Creates and initializes a store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened or written.
    pub async fn open(engine: Arc<dyn KvEngine>, config: StoreConfig) -> CoreResult<Self> {
        let store = Self::new(engine, config);
        store.initialize().await?;
        Ok(store)
    }

    /// Creates and initializes a store over a private in-memory engine.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    pub async fn open_in_memory() -> CoreResult<Self> {
        Self::open(Arc::new(InMemoryEngine::new()), StoreConfig::default()).await
    }

    /// Connects, loads or creates the root document, and starts the sync
    /// listener. Calling it again is a no-op.
    ///
    /// A stored document that is corrupt or newer than this build supports
    /// is replaced by a fresh default document, which is persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened or written, or if
    /// the store is closed.
    pub async fn initialize(&self) -> CoreResult<()> {
        self.check_open()?;
        self.ensure_root().await?;

        if self.inner.sync.is_enabled() && !self.inner.sync.is_listening() {
            self.start_sync_listener();
        }
        Ok(())
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Identifier this instance stamps on outbound sync messages.
    pub fn instance_id(&self) -> &str {
        self.inner.sync.tab_id()
    }

    fn check_open(&self) -> CoreResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(CoreError::Closed);
        }
        Ok(())
    }

    fn root_key(&self) -> &str {
        &self.inner.config.root_key
    }

    // === Root document ===

    /// Makes sure the root document is in the cache, loading it if needed.
    async fn ensure_root(&self) -> CoreResult<()> {
        if self.inner.state.lock().cache.contains(self.root_key()) {
            return Ok(());
        }

        let _guard = self.inner.load_lock.lock().await;
        if self.inner.state.lock().cache.contains(self.root_key()) {
            return Ok(());
        }

        let key = self.root_key().to_string();
        let backend = &self.inner.backend;
        let stored = self
            .inner
            .retry
            .run("load", backend, || backend.get(&key))
            .await?;

        let (document, persist) = match stored {
            None => {
                info!(key = %key, "no stored document, creating default");
                (default_document(), true)
            }
            Some(raw) => match validate_loaded(raw) {
                Ok(document) => (document, false),
                Err(e) => {
                    warn!(key = %key, error = %e, "stored document unusable, replacing with default");
                    self.inner.stats.record_recovery();
                    (default_document(), true)
                }
            },
        };

        if persist {
            self.write_document(&key, &document).await?;
        }

        debug!(key = %key, "root document loaded");
        self.inner.state.lock().cache.insert(key, document);
        Ok(())
    }

    async fn write_document(&self, key: &str, document: &Value) -> CoreResult<usize> {
        let bytes = serde_json::to_vec(document)?.len();
        let backend = &self.inner.backend;
        self.inner
            .retry
            .run("write", backend, || backend.set(key, document.clone()))
            .await?;
        self.inner.stats.record_backend_write(bytes as u64);
        Ok(bytes)
    }

    /// Runs `f` on the cached root, reloading it if it was evicted between
    /// the load and the call.
    async fn with_root<R>(&self, mut f: impl FnMut(&mut State, &str) -> Option<R>) -> CoreResult<R> {
        for _ in 0..3 {
            self.ensure_root().await?;
            let mut state = self.inner.state.lock();
            if let Some(result) = f(&mut *state, self.root_key()) {
                return Ok(result);
            }
        }
        Err(CoreError::invalid_operation("root document could not be kept in cache"))
    }

    // === Reads ===

    /// Reads the raw value at `path`. The empty path returns the whole
    /// document.
    ///
    /// # Errors
    ///
    /// Returns an error if the root document cannot be loaded.
    pub async fn get_value(&self, path: impl Into<DocPath>) -> CoreResult<Option<Value>> {
        self.check_open()?;
        let path = path.into();
        let value = self
            .with_root(|state, key| {
                let root = state.cache.get(key)?;
                Some(get_value_at_path(root, &path).cloned())
            })
            .await?;
        self.inner.stats.record_read();
        Ok(value)
    }

    /// Reads and deserializes the value at `path`.
    ///
    /// A missing value or an explicit `null` reads as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Serialization`] if the value does not
    /// deserialize into `T`.
    pub async fn get_path<T: DeserializeOwned>(
        &self,
        path: impl Into<DocPath>,
    ) -> CoreResult<Option<T>> {
        match self.get_value(path).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    // === Writes ===

    /// Writes `value` at `path`, creating intermediate objects as needed.
    ///
    /// The new value is visible to reads immediately; persistence follows
    /// after the debounce window or on [`Store::flush`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if a non-object is written to
    /// the root, or an error if `value` does not serialize.
    pub async fn set_path<T: Serialize>(&self, path: impl Into<DocPath>, value: T) -> CoreResult<()> {
        let value = serde_json::to_value(value)?;
        self.set_value(path.into(), value).await
    }

    async fn set_value(&self, path: DocPath, value: Value) -> CoreResult<()> {
        self.check_open()?;
        if path.is_root() && !value.is_object() {
            return Err(CoreError::invalid_operation("root document must be an object"));
        }

        let previous = self
            .with_root(|state, key| {
                let root = state.cache.get_mut(key)?;
                let previous = get_value_at_path(root, &path).cloned();
                set_value_at_path(root, &path, value.clone());
                state.pending.record(path.clone(), Some(value.clone()));
                state.cache.pin(key);
                Some(previous)
            })
            .await?;

        self.inner.stats.record_write();
        self.commit_local(path, Some(value), previous);
        Ok(())
    }

    /// Removes the value at `path`. Removing a missing value does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for the root path.
    pub async fn delete_path(&self, path: impl Into<DocPath>) -> CoreResult<()> {
        self.check_open()?;
        let path = path.into();
        if path.is_root() {
            return Err(CoreError::invalid_operation(
                "the root document cannot be deleted, use clear()",
            ));
        }

        let previous = self
            .with_root(|state, key| {
                let root = state.cache.get_mut(key)?;
                let previous = remove_value_at_path(root, &path);
                if previous.is_some() {
                    state.pending.record(path.clone(), None);
                    state.cache.pin(key);
                }
                Some(previous)
            })
            .await?;

        if previous.is_none() {
            return Ok(());
        }
        self.inner.stats.record_delete();
        self.commit_local(path, None, previous);
        Ok(())
    }

    /// Announces a local mutation already applied to the cache.
    fn commit_local(&self, path: DocPath, value: Option<Value>, previous_value: Option<Value>) {
        let event = ChangeEvent {
            path,
            value,
            previous_value,
            timestamp: now_millis(),
            source: ChangeSource::Local,
        };
        self.inner.bus.emit(&event);
        if self.inner.sync.broadcast(&event) {
            self.inner.stats.record_broadcast_sent();
        }
        self.schedule_flush();
    }

    // === Subscriptions ===

    /// Calls `handler` for every change at `path` or below it.
    pub fn subscribe<F>(&self, path: impl Into<DocPath>, handler: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.inner.bus.on(path, handler)
    }

    /// Registers a shared handler. The same handler registered twice on one
    /// path is called once per change.
    pub fn subscribe_handler(&self, path: impl Into<DocPath>, handler: Handler) -> Subscription {
        self.inner.bus.on_handler(path, handler)
    }

    /// Calls `handler` for every change anywhere in the document.
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.inner.bus.on_any(handler)
    }

    // === Persistence ===

    /// (Re)arms the debounce timer.
    fn schedule_flush(&self) {
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.config.debounce;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The flush runs in its own task so re-arming the timer never
            // cancels a backend write in progress.
            tokio::spawn(timer_flush(weak));
        });

        if let Some(previous) = self.inner.timer.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Writes every pending mutation to the backend now.
    ///
    /// Cancels the debounce timer. With nothing pending no backend call is
    /// made. Flushes never overlap.
    ///
    /// # Errors
    ///
    /// Returns the backend error once retries are exhausted. The writes stay
    /// pending for the next flush and the in-memory state is kept.
    pub async fn flush(&self) -> CoreResult<FlushReport> {
        self.inner.cancel_timer();
        self.flush_pending().await
    }

    async fn flush_pending(&self) -> CoreResult<FlushReport> {
        let _guard = self.inner.flush_lock.lock().await;
        let key = self.root_key().to_string();

        let (writes, snapshot) = {
            let mut state = self.inner.state.lock();
            if state.pending.is_empty() {
                // Remote changes may have superseded every queued write
                state.cache.unpin(&key);
                return Ok(FlushReport::default());
            }
            let writes = state.pending.take();
            let snapshot = state.cache.get(&key).cloned();
            (writes, snapshot)
        };

        let Some(mut document) = snapshot else {
            // The root is pinned while writes are pending, so this only
            // happens if the cache was cleared underneath us.
            self.inner.state.lock().pending.requeue(writes);
            return Err(CoreError::invalid_operation("root document missing from cache"));
        };

        for (path, value) in &writes {
            match value {
                Some(value) => set_value_at_path(&mut document, path, value.clone()),
                None => {
                    remove_value_at_path(&mut document, path);
                }
            }
        }
        let at = now_millis();
        stamp_modified(&mut document, at);
        if self.inner.config.compress_on_flush {
            prune_empty(&mut document);
        }

        let paths: Vec<DocPath> = writes.iter().map(|(p, _)| p.clone()).collect();
        match self.write_document(&key, &document).await {
            Ok(bytes) => {
                let mut state = self.inner.state.lock();
                if let Some(root) = state.cache.get_mut(&key) {
                    stamp_modified(root, at);
                }
                if state.pending.is_empty() {
                    state.cache.unpin(&key);
                }
                drop(state);

                self.inner.stats.record_flush();
                debug!(paths = paths.len(), bytes, "flushed pending writes");
                Ok(FlushReport {
                    paths,
                    bytes,
                    wrote: true,
                })
            }
            Err(e) => {
                self.inner.state.lock().pending.requeue(writes);
                self.inner.stats.record_flush_failure();
                warn!(paths = paths.len(), error = %e, "flush failed, writes kept pending");
                if let Err(reconnect) = self.inner.backend.reconnect().await {
                    debug!(error = %reconnect, "reconnect after failed flush failed");
                }
                Err(e)
            }
        }
    }

    /// Paths with writes waiting for the next flush.
    pub fn pending_writes(&self) -> Vec<DocPath> {
        self.inner.state.lock().pending.paths()
    }

    // === Synchronization ===

    fn start_sync_listener(&self) {
        let Some(mut receiver) = self.inner.sync.subscribe() else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let store = Store { inner };
                if let Err(e) = store.apply_remote(message).await {
                    warn!(error = %e, "failed to apply sync message");
                }
            }
        });
        self.inner.sync.set_listener(handle);
        debug!(tab = %self.instance_id(), "sync listener started");
    }

    /// Applies a change made by another instance.
    ///
    /// The cache is patched and subscribers are notified with
    /// [`ChangeSource::Remote`]. Nothing is broadcast and nothing is queued
    /// for persistence; local writes still pending are folded over so they
    /// do not resurrect the old value on the next flush. Messages from this
    /// instance, and deletes of paths that are already absent, are ignored.
    /// Returns true if the message was applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the root document cannot be loaded.
    pub async fn apply_remote(&self, message: SyncMessage) -> CoreResult<bool> {
        self.check_open()?;
        if !self.inner.sync.is_foreign(&message) {
            return Ok(false);
        }

        let path = DocPath::from_segments(message.path);
        if path.is_root() && !message.value.as_ref().is_some_and(Value::is_object) {
            warn!(origin = %message.origin, "ignoring remote root change that is not an object");
            return Ok(false);
        }

        let value = message.value;
        let applied = self
            .with_root(|state, key| {
                let root = state.cache.get_mut(key)?;
                let previous = match &value {
                    Some(v) => {
                        let previous = get_value_at_path(root, &path).cloned();
                        set_value_at_path(root, &path, v.clone());
                        previous
                    }
                    None => match remove_value_at_path(root, &path) {
                        Some(previous) => Some(previous),
                        None => return Some(None),
                    },
                };
                state.pending.absorb_remote(&path, value.as_ref());
                Some(Some(previous))
            })
            .await?;

        // Deleting a path this instance does not have changes nothing
        let Some(previous) = applied else {
            debug!(path = %path, "remote delete of a missing path");
            return Ok(false);
        };

        self.inner.stats.record_broadcast_received();
        let event = ChangeEvent {
            path,
            value,
            previous_value: previous,
            timestamp: message.timestamp,
            source: ChangeSource::Remote,
        };
        self.inner.bus.emit(&event);
        Ok(true)
    }

    /// Stops posting local changes to other instances.
    pub fn pause_sync(&self) {
        self.inner.sync.pause();
    }

    /// Resumes posting local changes to other instances.
    pub fn resume_sync(&self) {
        self.inner.sync.resume();
    }

    /// Returns true while outbound synchronization is paused.
    pub fn is_sync_paused(&self) -> bool {
        self.inner.sync.is_paused()
    }

    // === Backup ===

    /// Serializes the current document, including unflushed changes, as a
    /// backup envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be loaded or encoded.
    pub async fn backup(&self) -> CoreResult<String> {
        self.check_open()?;
        let document = self
            .with_root(|state, key| state.cache.get(key).cloned())
            .await?;
        BackupEnvelope::new(document)?.to_json()
    }

    /// Replaces the document with a backup. Returns false, leaving the store
    /// untouched, if the backup does not validate.
    ///
    /// The restored document is flushed immediately. If that flush fails the
    /// restore still counts as done and the write stays pending.
    pub async fn restore(&self, backup: &str) -> bool {
        match self.try_restore(backup).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "restore rejected");
                false
            }
        }
    }

    /// Like [`Store::restore`], reporting why a backup was rejected.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ImportValidation`] for an invalid backup.
    pub async fn try_restore(&self, backup: &str) -> CoreResult<()> {
        self.check_open()?;
        let envelope = BackupEnvelope::parse(backup)?;
        let exported_at = envelope.exported_at;
        self.set_value(DocPath::root(), envelope.into_data()).await?;

        if let Err(e) = self.flush().await {
            warn!(error = %e, "flush after restore failed, restored document stays pending");
        }
        info!(exported_at, "backup restored");
        Ok(())
    }

    /// Resets the document to the default shape and persists it.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub async fn clear(&self) -> CoreResult<()> {
        self.set_value(DocPath::root(), default_document()).await?;
        self.flush().await.map(|_| ())
    }

    // === Introspection ===

    /// Describes the backend and the write queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub async fn storage_info(&self) -> CoreResult<StorageInfo> {
        self.check_open()?;
        let backend = &self.inner.backend;
        let entries = self
            .inner
            .retry
            .run("info", backend, || backend.get_all())
            .await?;

        let mut approximate_bytes = 0;
        for (key, value) in &entries {
            approximate_bytes += key.len() + serde_json::to_vec(value)?.len();
        }
        let mut keys: Vec<String> = entries.into_iter().map(|(k, _)| k).collect();
        keys.sort();

        let config = backend.config();
        Ok(StorageInfo {
            db_name: config.db_name.clone(),
            store_name: config.store_name.clone(),
            version: config.version,
            key_count: keys.len(),
            keys,
            approximate_bytes,
            pending_writes: self.inner.state.lock().pending.len(),
            connected: backend.is_connected(),
        })
    }

    /// Cache statistics. Expired entries are purged first.
    pub fn cache_stats(&self) -> CacheStats {
        self.inner.state.lock().cache.stats()
    }

    /// Operation counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot(
            self.inner.bus.emitted(),
            self.inner.bus.handler_panics(),
            self.inner.retry.total_retries(),
        )
    }

    // === Lifecycle ===

    /// Flushes pending writes, stops synchronization and closes the backend.
    /// Later operations fail with [`CoreError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns the flush error. The store is closed either way.
    pub async fn close(&self) -> CoreResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let flushed = self.flush().await;

        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.cancel_timer();
        self.inner.sync.stop();
        self.inner.backend.close().await;
        info!(db = %self.inner.config.backend.db_name, "store closed");

        flushed.map(|_| ())
    }

    /// Returns true until [`Store::close`] has been called.
    pub fn is_open(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Timer-driven flush. Failures are logged; the writes stay queued.
async fn timer_flush(inner: Weak<Inner>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    if inner.closed.load(Ordering::SeqCst) {
        return;
    }
    let store = Store { inner };
    if let Err(e) = store.flush_pending().await {
        warn!(error = %e, "debounced flush failed");
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("db", &self.inner.config.backend.db_name)
            .field("instance", &self.instance_id())
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn fast_config() -> StoreConfig {
        StoreConfig::default()
            .with_debounce(Duration::from_millis(50))
            .with_retry(crate::RetryConfig::no_retry())
    }

    async fn store() -> Store {
        Store::open(Arc::new(InMemoryEngine::new()), fast_config())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn initialize_creates_default_document() {
        let store = store().await;
        let theme: Option<String> = store.get_path("preferences.theme").await.unwrap();
        assert_eq!(theme.as_deref(), Some("light"));
        assert!(store.pending_writes().is_empty());
    }

    #[tokio::test]
    async fn read_your_writes_before_flush() {
        let store = store().await;
        store.set_path("a.b.c", 5).await.unwrap();

        assert_eq!(store.get_path::<i64>("a.b.c").await.unwrap(), Some(5));
        assert_eq!(store.get_value("a.b").await.unwrap(), Some(json!({"c": 5})));
        assert_eq!(store.pending_writes(), vec![DocPath::parse("a.b.c")]);
    }

    #[tokio::test]
    async fn null_reads_as_none() {
        let store = store().await;
        assert_eq!(store.get_path::<String>("projects.active").await.unwrap(), None);
        assert_eq!(store.get_value("projects.active").await.unwrap(), Some(Value::Null));
    }

    #[tokio::test]
    async fn root_rules() {
        let store = store().await;
        assert!(matches!(
            store.set_path("", 1).await,
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(matches!(
            store.delete_path("").await,
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[tokio::test]
    async fn deleting_missing_path_is_silent() {
        let store = store().await;
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _sub = store.subscribe_all(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.delete_path("no.such.path").await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(store.pending_writes().is_empty());
    }

    #[tokio::test]
    async fn flush_with_nothing_pending_writes_nothing() {
        let store = store().await;
        let before = store.stats().backend_writes;
        let report = store.flush().await.unwrap();
        assert!(!report.wrote);
        assert_eq!(store.stats().backend_writes, before);
    }

    #[tokio::test]
    async fn flush_reports_paths() {
        let store = store().await;
        store.set_path("x", 1).await.unwrap();
        store.set_path("y", 2).await.unwrap();
        store.set_path("x", 3).await.unwrap();

        let report = store.flush().await.unwrap();
        assert!(report.wrote);
        assert_eq!(report.paths, vec![DocPath::parse("y"), DocPath::parse("x")]);
        assert!(report.bytes > 0);
        assert!(store.pending_writes().is_empty());
        assert!(store.cache_stats().pinned.is_empty());
    }

    #[tokio::test]
    async fn root_pinned_while_pending() {
        let store = store().await;
        store.set_path("x", 1).await.unwrap();
        assert_eq!(store.cache_stats().pinned, vec!["root".to_string()]);
    }

    #[tokio::test]
    async fn closed_store_rejects_operations() {
        let store = store().await;
        store.set_path("x", 1).await.unwrap();
        store.close().await.unwrap();

        assert!(!store.is_open());
        assert!(matches!(store.get_value("x").await, Err(CoreError::Closed)));
        assert!(matches!(store.set_path("x", 2).await, Err(CoreError::Closed)));
        // Closing twice is fine
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn own_messages_are_ignored() {
        let store = store().await;
        let message = SyncMessage {
            path: vec!["x".into()],
            value: Some(json!(1)),
            previous_value: None,
            timestamp: 0,
            source: ChangeSource::Local,
            origin: store.instance_id().to_string(),
        };
        assert!(!store.apply_remote(message).await.unwrap());
        assert_eq!(store.get_value("x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_resets_to_default() {
        let store = store().await;
        store.set_path("preferences.theme", "dark").await.unwrap();
        store.clear().await.unwrap();

        let theme: Option<String> = store.get_path("preferences.theme").await.unwrap();
        assert_eq!(theme.as_deref(), Some("light"));
        assert!(store.pending_writes().is_empty());
    }
}
