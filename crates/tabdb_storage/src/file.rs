//! File-based key-value engine for persistent storage.

use crate::engine::{KvConnection, KvEngine, SchemaUpgrade, UpgradeFn};
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// On-disk image of one database file.
#[derive(Debug, Default, Clone)]
struct DatabaseImage {
    version: u32,
    stores: BTreeMap<String, BTreeMap<String, Value>>,
}

impl DatabaseImage {
    fn from_json(value: Value) -> StorageResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| StorageError::connection("database file is not a JSON object"))?;

        let version = obj
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| StorageError::connection("database file has no version"))?;

        let mut stores = BTreeMap::new();
        if let Some(raw) = obj.get("stores").and_then(Value::as_object) {
            for (name, entries) in raw {
                let entries = entries
                    .as_object()
                    .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();
                stores.insert(name.clone(), entries);
            }
        }

        Ok(Self {
            version: u32::try_from(version)
                .map_err(|_| StorageError::connection("database version out of range"))?,
            stores,
        })
    }

    fn to_json(&self) -> Value {
        let stores: Map<String, Value> = self
            .stores
            .iter()
            .map(|(name, entries)| {
                let entries: Map<String, Value> =
                    entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                (name.clone(), Value::Object(entries))
            })
            .collect();

        let mut root = Map::new();
        root.insert("version".into(), Value::from(self.version));
        root.insert("stores".into(), Value::Object(stores));
        Value::Object(root)
    }
}

/// A file-based key-value engine.
///
/// Each database lives in `<dir>/<db_name>.json`. Every mutation rewrites the
/// file through a temporary file and a rename, so a crash leaves either the
/// old or the new image on disk.
///
/// # Thread Safety
///
/// All file access goes through one engine-wide lock. Connections opened from
/// clones of the same engine therefore never interleave partial writes.
///
/// # Example
///
/// ```no_run
/// use tabdb_storage::{FileEngine, KvEngine, SchemaUpgrade};
///
/// let engine = FileEngine::open_with_create_dirs("data").unwrap();
/// let conn = engine
///     .open("app", 1, &mut |tx: &mut dyn SchemaUpgrade, _old| tx.create_store("kv"))
///     .unwrap();
/// conn.set("kv", "k", serde_json::json!({"persisted": true})).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FileEngine {
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileEngine {
    /// Creates an engine over an existing directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a directory.
    pub fn open(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", dir.display()),
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            lock: Arc::new(Mutex::new(())),
        })
    }

    /// Creates an engine, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open_with_create_dirs(dir: impl AsRef<Path>) -> StorageResult<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Self::open(dir)
    }

    /// Returns the engine directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file backing the named database.
    #[must_use]
    pub fn database_path(&self, db_name: &str) -> PathBuf {
        self.dir.join(format!("{db_name}.json"))
    }
}

fn load_image(path: &Path) -> StorageResult<Option<DatabaseImage>> {
    match fs::read(path) {
        Ok(bytes) => {
            let value: Value = serde_json::from_slice(&bytes)?;
            DatabaseImage::from_json(value).map(Some)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn save_image(path: &Path, image: &DatabaseImage) -> StorageResult<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&serde_json::to_vec(&image.to_json())?)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

struct FileUpgrade<'a> {
    stores: &'a mut BTreeMap<String, BTreeMap<String, Value>>,
}

impl SchemaUpgrade for FileUpgrade<'_> {
    fn has_store(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    fn create_store(&mut self, name: &str) -> StorageResult<()> {
        self.stores.entry(name.to_string()).or_default();
        Ok(())
    }
}

impl KvEngine for FileEngine {
    fn open(
        &self,
        db_name: &str,
        version: u32,
        upgrade: &mut UpgradeFn<'_>,
    ) -> StorageResult<Arc<dyn KvConnection>> {
        if version == 0 {
            return Err(StorageError::connection("database version must be at least 1"));
        }

        let path = self.database_path(db_name);
        let _guard = self.lock.lock();

        let mut image = load_image(&path)
            .map_err(|e| StorageError::connection(format!("cannot load {}: {e}", path.display())))?
            .unwrap_or_default();

        if version < image.version {
            return Err(StorageError::connection(format!(
                "requested version {} is older than stored version {}",
                version, image.version
            )));
        }

        if version > image.version {
            let old_version = image.version;
            upgrade(&mut FileUpgrade { stores: &mut image.stores }, old_version).map_err(|e| {
                StorageError::connection(format!("upgrade to v{version} failed: {e}"))
            })?;
            image.version = version;
            save_image(&path, &image)
                .map_err(|e| StorageError::connection(format!("cannot save upgrade: {e}")))?;
        }

        Ok(Arc::new(FileConnection {
            path,
            version,
            lock: Arc::clone(&self.lock),
            closed: AtomicBool::new(false),
        }))
    }
}

struct FileConnection {
    path: PathBuf,
    version: u32,
    lock: Arc<Mutex<()>>,
    closed: AtomicBool,
}

impl FileConnection {
    fn read_store<R>(
        &self,
        store: &str,
        key: &str,
        f: impl FnOnce(&BTreeMap<String, Value>) -> R,
    ) -> StorageResult<R> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        let _guard = self.lock.lock();
        let image = load_image(&self.path)
            .map_err(|e| StorageError::read(key, e.to_string()))?
            .unwrap_or_default();
        image
            .stores
            .get(store)
            .map(f)
            .ok_or_else(|| StorageError::StoreNotFound(store.to_string()))
    }

    fn write_store(
        &self,
        store: &str,
        key: &str,
        f: impl FnOnce(&mut BTreeMap<String, Value>),
    ) -> StorageResult<()> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        let _guard = self.lock.lock();
        let mut image = load_image(&self.path)
            .map_err(|e| StorageError::write(key, e.to_string()))?
            .unwrap_or_default();
        let entries = image
            .stores
            .get_mut(store)
            .ok_or_else(|| StorageError::StoreNotFound(store.to_string()))?;
        f(entries);
        save_image(&self.path, &image).map_err(|e| StorageError::write(key, e.to_string()))
    }
}

impl KvConnection for FileConnection {
    fn get(&self, store: &str, key: &str) -> StorageResult<Option<Value>> {
        self.read_store(store, key, |s| s.get(key).cloned())
    }

    fn set(&self, store: &str, key: &str, value: Value) -> StorageResult<()> {
        self.write_store(store, key, |s| {
            s.insert(key.to_string(), value);
        })
    }

    fn delete(&self, store: &str, key: &str) -> StorageResult<()> {
        self.write_store(store, key, |s| {
            s.remove(key);
        })
    }

    fn clear(&self, store: &str) -> StorageResult<()> {
        self.write_store(store, "*", |s| s.clear())
    }

    fn keys(&self, store: &str) -> StorageResult<Vec<String>> {
        self.read_store(store, "*", |s| s.keys().cloned().collect())
    }

    fn get_all(&self, store: &str) -> StorageResult<Vec<(String, Value)>> {
        self.read_store(store, "*", |s| {
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn open_kv(engine: &FileEngine) -> Arc<dyn KvConnection> {
        engine
            .open("app", 1, &mut |tx: &mut dyn SchemaUpgrade, _old| {
                tx.create_store("kv")
            })
            .unwrap()
    }

    #[test]
    fn file_creates_database_file() {
        let dir = tempdir().unwrap();
        let engine = FileEngine::open(dir.path()).unwrap();
        open_kv(&engine);
        assert!(engine.database_path("app").exists());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let engine = FileEngine::open(dir.path()).unwrap();
            let conn = open_kv(&engine);
            conn.set("kv", "doc", json!({"name": "Foo"})).unwrap();
            conn.close();
        }

        {
            let engine = FileEngine::open(dir.path()).unwrap();
            let conn = open_kv(&engine);
            assert_eq!(conn.get("kv", "doc").unwrap(), Some(json!({"name": "Foo"})));
        }
    }

    #[test]
    fn file_connections_see_each_other() {
        let dir = tempdir().unwrap();
        let engine = FileEngine::open(dir.path()).unwrap();
        let a = open_kv(&engine);
        let b = open_kv(&engine.clone());

        a.set("kv", "x", json!(1)).unwrap();
        assert_eq!(b.get("kv", "x").unwrap(), Some(json!(1)));
    }

    #[test]
    fn file_keys_delete_clear() {
        let dir = tempdir().unwrap();
        let engine = FileEngine::open(dir.path()).unwrap();
        let conn = open_kv(&engine);

        conn.set("kv", "b", json!(2)).unwrap();
        conn.set("kv", "a", json!(1)).unwrap();
        assert_eq!(conn.keys("kv").unwrap(), vec!["a", "b"]);

        conn.delete("kv", "a").unwrap();
        assert_eq!(conn.get_all("kv").unwrap(), vec![("b".to_string(), json!(2))]);

        conn.clear("kv").unwrap();
        assert!(conn.keys("kv").unwrap().is_empty());
    }

    #[test]
    fn file_closed_connection_fails() {
        let dir = tempdir().unwrap();
        let engine = FileEngine::open(dir.path()).unwrap();
        let conn = open_kv(&engine);
        conn.close();
        assert!(matches!(conn.get("kv", "a"), Err(StorageError::Closed)));
    }

    #[test]
    fn file_corrupt_database_is_connection_error() {
        let dir = tempdir().unwrap();
        let engine = FileEngine::open(dir.path()).unwrap();
        fs::write(engine.database_path("app"), b"not json").unwrap();

        let result = engine.open("app", 1, &mut |tx: &mut dyn SchemaUpgrade, _old| {
            tx.create_store("kv")
        });
        assert!(matches!(result, Err(StorageError::Connection { .. })));
    }

    #[test]
    fn file_open_missing_dir_fails() {
        let dir = tempdir().unwrap();
        assert!(FileEngine::open(dir.path().join("missing")).is_err());
        assert!(FileEngine::open_with_create_dirs(dir.path().join("nested/dir")).is_ok());
    }
}
