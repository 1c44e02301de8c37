//! CLI command implementations.

pub mod backup;
pub mod document;
pub mod info;

use std::path::Path;
use std::sync::Arc;
use tabdb_core::{CoreError, Store, StoreConfig};
use tabdb_storage::{BackendConfig, FileEngine, StorageError};
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Store operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Engine could not be opened.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// File could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output could not be encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Opens the file-backed store named `db` in `dir`, creating the directory
/// if needed.
pub async fn open_store(dir: &Path, db: &str) -> CliResult<Store> {
    let engine = FileEngine::open_with_create_dirs(dir)?;
    debug!(path = %engine.database_path(db).display(), "opening store");

    let config = StoreConfig::default().with_backend(BackendConfig::new(db, "app_state"));
    Ok(Store::open(Arc::new(engine), config).await?)
}
