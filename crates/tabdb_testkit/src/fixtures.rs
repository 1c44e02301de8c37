//! Test fixtures and store helpers.
//!
//! Provides stores with test-friendly timings, a fault-injecting engine,
//! and pairs of synchronized stores that model two tabs.

use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tabdb_channel::LocalBroadcastHub;
use tabdb_core::{RetryConfig, Store, StoreConfig};
use tabdb_storage::{
    BackendConfig, FileEngine, InMemoryEngine, KvConnection, KvEngine, StorageError,
    StorageResult, UpgradeFn,
};
use tempfile::TempDir;

/// Configuration with short timings for tests.
///
/// Debounce 20 ms, three attempts with 1 ms initial backoff, 1 s connect
/// timeout.
pub fn fast_config() -> StoreConfig {
    StoreConfig::default()
        .with_backend(BackendConfig::default().with_connect_timeout(Duration::from_secs(1)))
        .with_debounce(Duration::from_millis(20))
        .with_retry(
            RetryConfig::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(5)),
        )
}

/// [`fast_config`] with a debounce long enough that only explicit flushes
/// reach the backend.
pub fn quiet_config() -> StoreConfig {
    fast_config().with_debounce(Duration::from_secs(60))
}

#[derive(Debug, Default)]
struct Counters {
    opens: AtomicUsize,
    writes: AtomicUsize,
    failed_writes: AtomicUsize,
    fail_next_writes: AtomicUsize,
    fail_next_opens: AtomicUsize,
}

/// Takes one unit from a failure budget. Returns true if a failure is due.
fn take_failure(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// An engine wrapper that counts operations and fails on demand.
///
/// Clones share counters and failure budgets.
#[derive(Clone)]
pub struct FlakyEngine {
    inner: Arc<dyn KvEngine>,
    memory: Option<InMemoryEngine>,
    counters: Arc<Counters>,
}

impl FlakyEngine {
    /// Wraps a fresh in-memory engine.
    pub fn new() -> Self {
        Self::memory(InMemoryEngine::new())
    }

    /// Wraps an existing in-memory engine, keeping direct access to it.
    pub fn memory(engine: InMemoryEngine) -> Self {
        Self {
            inner: Arc::new(engine.clone()),
            memory: Some(engine),
            counters: Arc::default(),
        }
    }

    /// Wraps any engine.
    pub fn wrap(inner: Arc<dyn KvEngine>) -> Self {
        Self {
            inner,
            memory: None,
            counters: Arc::default(),
        }
    }

    /// The wrapped in-memory engine, if any.
    pub fn memory_engine(&self) -> Option<&InMemoryEngine> {
        self.memory.as_ref()
    }

    /// Makes the next `n` value writes fail.
    pub fn fail_writes(&self, n: usize) {
        self.counters.fail_next_writes.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` opens fail.
    pub fn fail_opens(&self, n: usize) {
        self.counters.fail_next_opens.store(n, Ordering::SeqCst);
    }

    /// Successful opens so far.
    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    /// Successful value writes so far.
    pub fn writes(&self) -> usize {
        self.counters.writes.load(Ordering::SeqCst)
    }

    /// Injected write failures so far.
    pub fn failed_writes(&self) -> usize {
        self.counters.failed_writes.load(Ordering::SeqCst)
    }

    /// Reads a persisted value from the wrapped in-memory engine.
    pub fn peek(&self, config: &BackendConfig, key: &str) -> Option<Value> {
        self.memory
            .as_ref()?
            .peek(&config.db_name, &config.store_name, key)
    }
}

impl Default for FlakyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FlakyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlakyEngine")
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl KvEngine for FlakyEngine {
    fn open(
        &self,
        db_name: &str,
        version: u32,
        upgrade: &mut UpgradeFn<'_>,
    ) -> StorageResult<Arc<dyn KvConnection>> {
        if take_failure(&self.counters.fail_next_opens) {
            return Err(StorageError::connection("injected open failure"));
        }
        let inner = self.inner.open(db_name, version, upgrade)?;
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FlakyConnection {
            inner,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct FlakyConnection {
    inner: Arc<dyn KvConnection>,
    counters: Arc<Counters>,
}

impl KvConnection for FlakyConnection {
    fn get(&self, store: &str, key: &str) -> StorageResult<Option<Value>> {
        self.inner.get(store, key)
    }

    fn set(&self, store: &str, key: &str, value: Value) -> StorageResult<()> {
        if take_failure(&self.counters.fail_next_writes) {
            self.counters.failed_writes.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::write(key, "injected write failure"));
        }
        self.inner.set(store, key, value)?;
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, store: &str, key: &str) -> StorageResult<()> {
        self.inner.delete(store, key)
    }

    fn clear(&self, store: &str) -> StorageResult<()> {
        self.inner.clear(store)
    }

    fn keys(&self, store: &str) -> StorageResult<Vec<String>> {
        self.inner.keys(store)
    }

    fn get_all(&self, store: &str) -> StorageResult<Vec<(String, Value)>> {
        self.inner.get_all(store)
    }

    fn close(&self) {
        self.inner.close();
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn version(&self) -> u32 {
        self.inner.version()
    }
}

/// A store with its engine and automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    /// The engine under the store.
    pub engine: FlakyEngine,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Opens an initialized store over a fresh in-memory engine.
    pub async fn memory() -> Self {
        Self::with_config(fast_config()).await
    }

    /// Opens an initialized in-memory store with a custom configuration.
    pub async fn with_config(config: StoreConfig) -> Self {
        Self::over(FlakyEngine::new(), config).await
    }

    /// Opens an initialized store over an existing engine.
    pub async fn over(engine: FlakyEngine, config: StoreConfig) -> Self {
        let store = Store::open(Arc::new(engine.clone()), config)
            .await
            .expect("Failed to open store");
        Self {
            store,
            engine,
            _temp_dir: None,
        }
    }

    /// Opens an initialized store over a file engine in a temporary
    /// directory.
    pub async fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let file_engine = FileEngine::open(temp_dir.path()).expect("Failed to open file engine");
        let engine = FlakyEngine::wrap(Arc::new(file_engine));
        let store = Store::open(Arc::new(engine.clone()), fast_config())
            .await
            .expect("Failed to open file store");
        Self {
            store,
            engine,
            _temp_dir: Some(temp_dir),
        }
    }

    /// The temporary directory of a file store.
    pub fn dir(&self) -> Option<&std::path::Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }

    /// The document persisted under the root key, for in-memory stores.
    pub fn persisted_root(&self) -> Option<Value> {
        let config = self.store.config();
        self.engine.peek(&config.backend, &config.root_key)
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Two initialized stores over one engine, synchronized through one channel,
/// as two tabs of the same application would be.
pub async fn tab_pair(config: StoreConfig) -> (Store, Store, FlakyEngine) {
    let engine = FlakyEngine::new();
    let hub = LocalBroadcastHub::new();

    let open = |config: StoreConfig| {
        let store = Store::with_hub(Arc::new(engine.clone()), config, &hub);
        async move {
            store.initialize().await.expect("Failed to initialize store");
            store
        }
    };

    let first = open(config.clone()).await;
    let second = open(config).await;
    (first, second, engine)
}

/// Waits until `condition` holds, yielding to other tasks in between.
///
/// Panics if it does not hold within `timeout`.
pub async fn wait_until<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
