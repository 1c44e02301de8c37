//! # TabDB Storage
//!
//! Key-value engine abstraction and the async backend adapter for TabDB.
//!
//! This crate provides the lowest-level persistence layer. Engines are
//! **opaque value stores** keyed by string: they do not interpret the
//! documents they hold.
//!
//! ## Design Principles
//!
//! - Engines are named, versioned databases of named object stores
//! - Object stores are created only inside the upgrade step of an open
//! - Engines are synchronous and `Send + Sync`; [`BackendAdapter`] moves
//!   their calls onto tokio's blocking pool
//! - One lazily opened, shared connection per adapter
//!
//! ## Available Engines
//!
//! - [`InMemoryEngine`] - For testing and ephemeral stores
//! - [`FileEngine`] - JSON files on disk
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tabdb_storage::{BackendAdapter, BackendConfig, InMemoryEngine};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let backend = BackendAdapter::new(Arc::new(InMemoryEngine::new()), BackendConfig::default());
//! backend.set("root", serde_json::json!({"hello": "world"})).await.unwrap();
//! assert!(backend.get("root").await.unwrap().is_some());
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod config;
mod engine;
mod error;
mod file;
mod memory;

pub use adapter::BackendAdapter;
pub use config::BackendConfig;
pub use engine::{KvConnection, KvEngine, SchemaUpgrade, UpgradeFn};
pub use error::{StorageError, StorageResult};
pub use file::FileEngine;
pub use memory::InMemoryEngine;
