//! In-memory key-value engine.

use crate::engine::{KvConnection, KvEngine, SchemaUpgrade, UpgradeFn};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type ObjectStores = HashMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Default)]
struct MemoryDatabase {
    version: u32,
    stores: ObjectStores,
}

/// An in-memory key-value engine.
///
/// Cloning the engine shares its databases, so several stores opened over
/// clones of one engine observe the same data. This is how tests model two
/// browser tabs over one persistent backend.
///
/// # Example
///
/// ```rust
/// use tabdb_storage::{InMemoryEngine, KvEngine, SchemaUpgrade};
///
/// let engine = InMemoryEngine::new();
/// let conn = engine
///     .open("app", 1, &mut |tx: &mut dyn SchemaUpgrade, _old| tx.create_store("kv"))
///     .unwrap();
/// conn.set("kv", "greeting", serde_json::json!("hello")).unwrap();
/// assert_eq!(conn.get("kv", "greeting").unwrap(), Some(serde_json::json!("hello")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryEngine {
    databases: Arc<RwLock<HashMap<String, MemoryDatabase>>>,
    open_flags: Arc<RwLock<Vec<Arc<AtomicBool>>>>,
}

impl InMemoryEngine {
    /// Creates a new engine with no databases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored version of a database, if it exists.
    #[must_use]
    pub fn database_version(&self, db_name: &str) -> Option<u32> {
        self.databases.read().get(db_name).map(|db| db.version)
    }

    /// Writes a value directly, bypassing connections.
    ///
    /// Useful for seeding corrupt or legacy documents in tests. The store is
    /// created if missing.
    pub fn seed(&self, db_name: &str, store: &str, key: &str, value: Value) {
        let mut dbs = self.databases.write();
        let db = dbs.entry(db_name.to_string()).or_default();
        db.stores
            .entry(store.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Reads a value directly, bypassing connections.
    #[must_use]
    pub fn peek(&self, db_name: &str, store: &str, key: &str) -> Option<Value> {
        self.databases
            .read()
            .get(db_name)
            .and_then(|db| db.stores.get(store))
            .and_then(|s| s.get(key))
            .cloned()
    }

    /// Closes every connection handed out so far, as an engine shutting
    /// down underneath its clients would.
    pub fn close_all(&self) {
        let mut flags = self.open_flags.write();
        for flag in flags.iter() {
            flag.store(true, Ordering::SeqCst);
        }
        flags.clear();
    }
}

struct MemoryUpgrade<'a> {
    stores: &'a mut ObjectStores,
}

impl SchemaUpgrade for MemoryUpgrade<'_> {
    fn has_store(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    fn create_store(&mut self, name: &str) -> StorageResult<()> {
        self.stores.entry(name.to_string()).or_default();
        Ok(())
    }
}

impl KvEngine for InMemoryEngine {
    fn open(
        &self,
        db_name: &str,
        version: u32,
        upgrade: &mut UpgradeFn<'_>,
    ) -> StorageResult<Arc<dyn KvConnection>> {
        if version == 0 {
            return Err(StorageError::connection("database version must be at least 1"));
        }

        {
            let mut dbs = self.databases.write();
            let db = dbs.entry(db_name.to_string()).or_default();

            if version < db.version {
                return Err(StorageError::connection(format!(
                    "requested version {} is older than stored version {}",
                    version, db.version
                )));
            }

            if version > db.version {
                let old_version = db.version;
                let mut staged = db.stores.clone();
                upgrade(&mut MemoryUpgrade { stores: &mut staged }, old_version).map_err(
                    |e| StorageError::connection(format!("upgrade to v{version} failed: {e}")),
                )?;
                db.stores = staged;
                db.version = version;
            }
        }

        let closed = Arc::new(AtomicBool::new(false));
        self.open_flags.write().push(Arc::clone(&closed));

        Ok(Arc::new(MemoryConnection {
            databases: Arc::clone(&self.databases),
            db_name: db_name.to_string(),
            version,
            closed,
        }))
    }
}

struct MemoryConnection {
    databases: Arc<RwLock<HashMap<String, MemoryDatabase>>>,
    db_name: String,
    version: u32,
    closed: Arc<AtomicBool>,
}

impl MemoryConnection {
    fn check_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    fn read_store<R>(
        &self,
        store: &str,
        f: impl FnOnce(&BTreeMap<String, Value>) -> R,
    ) -> StorageResult<R> {
        self.check_open()?;
        let dbs = self.databases.read();
        dbs.get(&self.db_name)
            .and_then(|db| db.stores.get(store))
            .map(f)
            .ok_or_else(|| StorageError::StoreNotFound(store.to_string()))
    }

    fn write_store<R>(
        &self,
        store: &str,
        f: impl FnOnce(&mut BTreeMap<String, Value>) -> R,
    ) -> StorageResult<R> {
        self.check_open()?;
        let mut dbs = self.databases.write();
        dbs.get_mut(&self.db_name)
            .and_then(|db| db.stores.get_mut(store))
            .map(f)
            .ok_or_else(|| StorageError::StoreNotFound(store.to_string()))
    }
}

impl KvConnection for MemoryConnection {
    fn get(&self, store: &str, key: &str) -> StorageResult<Option<Value>> {
        self.read_store(store, |s| s.get(key).cloned())
    }

    fn set(&self, store: &str, key: &str, value: Value) -> StorageResult<()> {
        self.write_store(store, |s| {
            s.insert(key.to_string(), value);
        })
    }

    fn delete(&self, store: &str, key: &str) -> StorageResult<()> {
        self.write_store(store, |s| {
            s.remove(key);
        })
    }

    fn clear(&self, store: &str) -> StorageResult<()> {
        self.write_store(store, |s| s.clear())
    }

    fn keys(&self, store: &str) -> StorageResult<Vec<String>> {
        self.read_store(store, |s| s.keys().cloned().collect())
    }

    fn get_all(&self, store: &str) -> StorageResult<Vec<(String, Value)>> {
        self.read_store(store, |s| {
            s.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn version(&self) -> u32 {
        self.version
    }
}
