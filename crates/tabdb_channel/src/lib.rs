//! # TabDB Channel
//!
//! Cross-instance change broadcast for TabDB.
//!
//! This crate provides:
//! - The [`SyncMessage`] wire format announcing one committed mutation
//! - The [`BroadcastChannel`] transport trait
//! - [`LocalBroadcastHub`], an in-process hub of named channels
//!
//! ## Key Invariants
//!
//! - Messages are JSON text on the wire
//! - Delivery is best-effort; a lagging receiver loses the oldest messages
//! - There is no conflict resolution: the last message observed wins

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod error;
mod hub;
mod message;

pub use channel::{BroadcastChannel, ChannelReceiver};
pub use error::{ChannelError, ChannelResult};
pub use hub::{LocalBroadcastHub, LocalChannel, DEFAULT_CAPACITY};
pub use message::{ChangeSource, SyncMessage};
