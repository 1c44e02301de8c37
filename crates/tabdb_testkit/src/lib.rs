//! # TabDB Testkit
//!
//! Test utilities for TabDB.
//!
//! This crate provides:
//! - Store fixtures with test-friendly timings
//! - A fault-injecting engine for failure and retry scenarios
//! - Property-based test generators using proptest
//!
//! The store-level integration tests live in this crate's `tests/`
//! directory.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tabdb_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_store() {
//!     let harness = TestStore::memory().await;
//!     harness.store.set_path("a.b", 1).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
