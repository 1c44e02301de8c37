//! Key-value engine traits.

use crate::error::StorageResult;
use serde_json::Value;
use std::sync::Arc;

/// Schema changes allowed while a database is being upgraded.
///
/// Object stores can only be created inside the upgrade step passed to
/// [`KvEngine::open`]. Implementations must make `create_store` on an
/// existing store a no-op.
pub trait SchemaUpgrade {
    /// Returns true if the named object store exists.
    fn has_store(&self, name: &str) -> bool;

    /// Creates the named object store.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot record the new store.
    fn create_store(&mut self, name: &str) -> StorageResult<()>;
}

/// Callback invoked by the engine during a version upgrade.
///
/// Receives the schema handle and the version stored before the upgrade
/// (0 for a database that did not exist).
pub type UpgradeFn<'a> = dyn FnMut(&mut dyn SchemaUpgrade, u32) -> StorageResult<()> + 'a;

/// A named, versioned key-value database engine.
///
/// Engines are **opaque value stores**. They do not interpret the JSON
/// values they hold; TabDB owns the document format.
///
/// # Invariants
///
/// - `upgrade` runs only when the database is new or `version` is greater
///   than the stored version
/// - Opening with a version lower than the stored one fails
/// - Engines must be `Send + Sync`; one engine may serve many connections
pub trait KvEngine: Send + Sync {
    /// Opens (creating if needed) the named database at `version`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Connection`] if the database cannot be
    /// opened, the stored version is newer, or the upgrade step fails.
    fn open(
        &self,
        db_name: &str,
        version: u32,
        upgrade: &mut UpgradeFn<'_>,
    ) -> StorageResult<Arc<dyn KvConnection>>;
}

/// An open handle to one database.
///
/// All operations address a named object store inside the database.
pub trait KvConnection: Send + Sync {
    /// Reads a value. Returns `None` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is missing, the connection is closed,
    /// or the engine fails.
    fn get(&self, store: &str, key: &str) -> StorageResult<Option<Value>>;

    /// Writes a value, overwriting any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is missing, the connection is closed,
    /// or the engine fails.
    fn set(&self, store: &str, key: &str, value: Value) -> StorageResult<()>;

    /// Deletes a key. Deleting an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is missing or the connection is closed.
    fn delete(&self, store: &str, key: &str) -> StorageResult<()>;

    /// Removes every key from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is missing or the connection is closed.
    fn clear(&self, store: &str) -> StorageResult<()>;

    /// Lists every key in the store, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is missing or the connection is closed.
    fn keys(&self, store: &str) -> StorageResult<Vec<String>>;

    /// Returns every key/value pair in the store, in ascending key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is missing or the connection is closed.
    fn get_all(&self, store: &str) -> StorageResult<Vec<(String, Value)>>;

    /// Closes the connection. Later operations fail with `Closed`.
    fn close(&self);

    /// Returns true once the connection has been closed.
    fn is_closed(&self) -> bool;

    /// The database version this connection was opened at.
    fn version(&self) -> u32;
}
