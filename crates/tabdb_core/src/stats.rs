//! Store statistics.
//!
//! Counters are atomic and can be read while operations are in progress.
//!
//! ```rust,ignore
//! let stats = store.stats();
//! println!("writes: {}, flushes: {}", stats.writes, stats.flushes);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for one store instance.
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Path reads.
    reads: AtomicU64,
    /// Path writes.
    writes: AtomicU64,
    /// Path deletes.
    deletes: AtomicU64,
    /// Flushes that wrote to the backend.
    flushes: AtomicU64,
    /// Flushes that failed after retries.
    flush_failures: AtomicU64,
    /// Root documents written to the backend, including the initial one.
    backend_writes: AtomicU64,
    /// Bytes of JSON written to the backend.
    bytes_written: AtomicU64,
    /// Outbound broadcasts.
    broadcasts_sent: AtomicU64,
    /// Inbound broadcasts applied.
    broadcasts_received: AtomicU64,
    /// Documents replaced with the default on load.
    recoveries: AtomicU64,
}

impl StoreStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush_failure(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_backend_write(&self, bytes: u64) {
        self.backend_writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_broadcast_sent(&self) {
        self.broadcasts_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_broadcast_received(&self) {
        self.broadcasts_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recovery(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters. Event and retry counts are owned
    /// by the bus and retry policy and passed in by the store.
    pub fn snapshot(&self, events_emitted: u64, handler_panics: u64, retries: u64) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            backend_writes: self.backend_writes.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            broadcasts_sent: self.broadcasts_sent.load(Ordering::Relaxed),
            broadcasts_received: self.broadcasts_received.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            events_emitted,
            handler_panics,
            retries,
        }
    }
}

/// A point-in-time copy of the store counters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Path reads.
    pub reads: u64,
    /// Path writes.
    pub writes: u64,
    /// Path deletes.
    pub deletes: u64,
    /// Flushes that wrote to the backend.
    pub flushes: u64,
    /// Flushes that failed after retries.
    pub flush_failures: u64,
    /// Root documents written to the backend.
    pub backend_writes: u64,
    /// Bytes of JSON written to the backend.
    pub bytes_written: u64,
    /// Outbound broadcasts.
    pub broadcasts_sent: u64,
    /// Inbound broadcasts applied.
    pub broadcasts_received: u64,
    /// Documents replaced with the default on load.
    pub recoveries: u64,
    /// Change events emitted.
    pub events_emitted: u64,
    /// Handler invocations that panicked.
    pub handler_panics: u64,
    /// Backend retries performed.
    pub retries: u64,
}
