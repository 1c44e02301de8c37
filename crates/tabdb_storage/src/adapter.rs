//! Async adapter over a key-value engine.
//!
//! The adapter owns the single shared connection of a store instance. The
//! connection is opened lazily on first use, reopened transparently after it
//! has been closed, and opened at most once at a time: callers that arrive
//! while an open is in flight wait for that attempt instead of starting their
//! own. An open that outlives the connect timeout is not abandoned: the next
//! caller waits on the same attempt rather than starting a second one.

use crate::config::BackendConfig;
use crate::engine::{KvConnection, KvEngine, SchemaUpgrade};
use crate::error::{StorageError, StorageResult};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type OpenTask = JoinHandle<StorageResult<Arc<dyn KvConnection>>>;

enum Slot {
    Empty,
    /// An open that timed out but may still complete.
    Opening(OpenTask),
    Open(Arc<dyn KvConnection>),
}

/// Lazily connected, async view of one object store.
pub struct BackendAdapter {
    engine: Arc<dyn KvEngine>,
    config: BackendConfig,
    /// Held across the open so concurrent callers share one attempt.
    connection: Mutex<Slot>,
    connected: AtomicBool,
    attempts: AtomicU64,
}

impl BackendAdapter {
    /// Creates an adapter. No connection is opened until first use.
    pub fn new(engine: Arc<dyn KvEngine>, config: BackendConfig) -> Self {
        Self {
            engine,
            config,
            connection: Mutex::new(Slot::Empty),
            connected: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
        }
    }

    /// Returns the adapter configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Number of connection attempts made so far.
    pub fn connection_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Returns true if a connection is currently held.
    ///
    /// Returns false while an open is in flight. A connection closed by the
    /// engine itself is noticed on the next operation.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Returns a live connection, opening one if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the open fails or exceeds the
    /// configured timeout.
    pub async fn get_connection(&self) -> StorageResult<Arc<dyn KvConnection>> {
        let mut slot = self.connection.lock().await;

        let mut task = match std::mem::replace(&mut *slot, Slot::Empty) {
            Slot::Open(conn) if !conn.is_closed() => {
                *slot = Slot::Open(Arc::clone(&conn));
                return Ok(conn);
            }
            Slot::Open(_) => {
                self.connected.store(false, Ordering::Release);
                debug!(db = %self.config.db_name, "connection closed underneath us, reopening");
                self.spawn_open()
            }
            Slot::Opening(task) => {
                debug!(db = %self.config.db_name, "waiting on earlier open");
                task
            }
            Slot::Empty => self.spawn_open(),
        };

        let result = match tokio::time::timeout(self.config.connect_timeout, &mut task).await {
            Ok(Ok(Ok(conn))) => Ok(conn),
            Ok(Ok(Err(e))) if e.is_connection() => Err(e),
            Ok(Ok(Err(e))) => Err(StorageError::connection(e.to_string())),
            Ok(Err(join)) => Err(StorageError::connection(format!("open task failed: {join}"))),
            Err(_) => {
                warn!(
                    db = %self.config.db_name,
                    timeout_ms = self.config.connect_timeout.as_millis() as u64,
                    "database open timed out"
                );
                *slot = Slot::Opening(task);
                return Err(StorageError::connection(format!(
                    "open timed out after {:?}",
                    self.config.connect_timeout
                )));
            }
        };

        let conn = result?;
        *slot = Slot::Open(Arc::clone(&conn));
        self.connected.store(true, Ordering::Release);
        Ok(conn)
    }

    fn spawn_open(&self) -> OpenTask {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let engine = Arc::clone(&self.engine);
        let db_name = self.config.db_name.clone();
        let store_name = self.config.store_name.clone();
        let version = self.config.version;

        debug!(db = %db_name, version, attempt, "opening database");

        tokio::task::spawn_blocking(move || {
            engine.open(&db_name, version, &mut |tx: &mut dyn SchemaUpgrade, old_version| {
                if !tx.has_store(&store_name) {
                    debug!(store = %store_name, old_version, "creating object store");
                    tx.create_store(&store_name)?;
                }
                Ok(())
            })
        })
    }

    /// Releases the connection. The next operation reopens it.
    ///
    /// A timed-out open still in flight is detached and its connection, if
    /// it ever arrives, is closed.
    pub async fn close(&self) {
        let mut slot = self.connection.lock().await;
        self.connected.store(false, Ordering::Release);
        match std::mem::replace(&mut *slot, Slot::Empty) {
            Slot::Open(conn) => {
                conn.close();
                debug!(db = %self.config.db_name, "connection closed");
            }
            Slot::Opening(task) => {
                let db = self.config.db_name.clone();
                tokio::spawn(async move {
                    if let Ok(Ok(conn)) = task.await {
                        conn.close();
                        debug!(db = %db, "closed connection from abandoned open");
                    }
                });
            }
            Slot::Empty => {}
        }
    }

    /// Force-closes the connection and opens a fresh one.
    ///
    /// # Errors
    ///
    /// Returns an error if the new connection cannot be opened.
    pub async fn reconnect(&self) -> StorageResult<()> {
        self.close().await;
        self.get_connection().await.map(|_| ())
    }

    /// Reads a value. Absent keys resolve to `None`.
    ///
    /// # Errors
    ///
    /// Returns a connection or read error.
    pub async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let conn = self.get_connection().await?;
        let store = self.config.store_name.clone();
        let owned = key.to_string();
        run_blocking(key, false, move || conn.get(&store, &owned)).await
    }

    /// Writes a value unconditionally.
    ///
    /// # Errors
    ///
    /// Returns a connection or write error.
    pub async fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        let conn = self.get_connection().await?;
        let store = self.config.store_name.clone();
        let owned = key.to_string();
        run_blocking(key, true, move || conn.set(&store, &owned, value)).await
    }

    /// Deletes a key.
    ///
    /// # Errors
    ///
    /// Returns a connection or write error.
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let conn = self.get_connection().await?;
        let store = self.config.store_name.clone();
        let owned = key.to_string();
        run_blocking(key, true, move || conn.delete(&store, &owned)).await
    }

    /// Removes every key from the object store.
    ///
    /// # Errors
    ///
    /// Returns a connection or write error.
    pub async fn clear(&self) -> StorageResult<()> {
        let conn = self.get_connection().await?;
        let store = self.config.store_name.clone();
        run_blocking("*", true, move || conn.clear(&store)).await
    }

    /// Lists every key in the object store.
    ///
    /// # Errors
    ///
    /// Returns a connection or read error.
    pub async fn keys(&self) -> StorageResult<Vec<String>> {
        let conn = self.get_connection().await?;
        let store = self.config.store_name.clone();
        run_blocking("*", false, move || conn.keys(&store)).await
    }

    /// Returns every key/value pair in the object store.
    ///
    /// # Errors
    ///
    /// Returns a connection or read error.
    pub async fn get_all(&self) -> StorageResult<Vec<(String, Value)>> {
        let conn = self.get_connection().await?;
        let store = self.config.store_name.clone();
        run_blocking("*", false, move || conn.get_all(&store)).await
    }
}

impl std::fmt::Debug for BackendAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendAdapter")
            .field("config", &self.config)
            .field("attempts", &self.connection_attempts())
            .finish_non_exhaustive()
    }
}

/// Runs an engine call on the blocking pool and tags raw failures with the
/// key and direction of the operation.
async fn run_blocking<T, F>(key: &str, write: bool, f: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StorageResult<T> + Send + 'static,
{
    let tag = |message: String| {
        if write {
            StorageError::write(key, message)
        } else {
            StorageError::read(key, message)
        }
    };

    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e @ (StorageError::Io(_) | StorageError::Json(_)))) => Err(tag(e.to_string())),
        Ok(Err(e)) => Err(e),
        Err(join) => Err(tag(format!("engine task failed: {join}"))),
    }
}
