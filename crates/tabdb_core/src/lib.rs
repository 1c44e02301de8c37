//! # TabDB Core
//!
//! Reactive, path-addressed document store for TabDB.
//!
//! This crate provides:
//! - The [`Store`] facade: typed reads and writes at dotted paths
//! - A path-keyed [`EventBus`] with bubbling to ancestor paths
//! - Debounced, coalesced persistence through a retrying backend
//! - Cross-instance synchronization over a broadcast channel
//! - A TTL- and size-bounded document cache
//! - Backup and restore envelopes with checksums
//! - Domain helpers for projects, entities, AI models and preferences
//!
//! ## Key Invariants
//!
//! - Exactly one authoritative in-memory copy of the document per store
//! - Reads observe every earlier write on the same store, flushed or not
//! - A failed flush never loses a write; it stays pending
//! - Remote changes are applied locally and never re-broadcast
//! - Concurrent writes across instances are last-writer-wins

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backup;
mod cache;
mod coalescer;
mod config;
mod document;
mod domain;
mod error;
mod event;
mod path;
mod retry;
mod stats;
mod store;
mod sync;

pub use backup::{checksum, BackupEnvelope, BACKUP_FORMAT, BACKUP_VERSION};
pub use cache::{CacheStats, DocumentCache};
pub use coalescer::{PendingWrite, WriteCoalescer};
pub use config::StoreConfig;
pub use document::{default_document, default_preferences, now_millis, DOCUMENT_VERSION, LAST_MODIFIED};
pub use domain::{AiModels, Entities, Preferences, Projects};
pub use error::{CoreError, CoreResult};
pub use event::{ChangeEvent, EventBus, Handler, Subscription};
pub use path::{
    get_value_at_path, remove_value_at_path, set_value_at_path, DocPath, MAX_ARRAY_GAP, SEPARATOR,
};
pub use retry::{RetryConfig, RetryPolicy};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::{FlushReport, StorageInfo, Store};
pub use sync::TabSync;

pub use tabdb_channel::ChangeSource;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
