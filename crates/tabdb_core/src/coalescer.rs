//! Write coalescing.
//!
//! Mutations are recorded as pending writes keyed by path. A later write to
//! the same path replaces the earlier one and moves to the back of the queue,
//! so a burst of writes collapses into one entry per path applied in
//! last-write order. A root write supersedes everything queued before it.

use crate::path::{remove_value_at_path, set_value_at_path, DocPath};
use serde_json::Value;

/// One queued mutation. `None` means delete.
pub type PendingWrite = (DocPath, Option<Value>);

/// Ordered set of pending writes, one per path.
#[derive(Debug, Default, Clone)]
pub struct WriteCoalescer {
    pending: Vec<PendingWrite>,
}

impl WriteCoalescer {
    /// Creates an empty coalescer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a write, replacing any pending write to the same path.
    pub fn record(&mut self, path: DocPath, value: Option<Value>) {
        if path.is_root() {
            self.pending.clear();
        } else {
            self.pending.retain(|(p, _)| *p != path);
        }
        self.pending.push((path, value));
    }

    /// Removes and returns every pending write in application order.
    pub fn take(&mut self) -> Vec<PendingWrite> {
        std::mem::take(&mut self.pending)
    }

    /// Puts writes from a failed flush back at the front of the queue.
    ///
    /// Paths written again since the flush started keep their newer value.
    /// If a root write has been queued since, the failed writes are obsolete
    /// and dropped.
    pub fn requeue(&mut self, writes: Vec<PendingWrite>) {
        if self.pending.iter().any(|(p, _)| p.is_root()) {
            return;
        }
        let mut restored: Vec<PendingWrite> = writes
            .into_iter()
            .filter(|(path, _)| !self.pending.iter().any(|(p, _)| p == path))
            .collect();
        restored.append(&mut self.pending);
        self.pending = restored;
    }

    /// Folds a change made by another instance into the queue.
    ///
    /// Pending writes at or below `path` are superseded and dropped. Pending
    /// writes to an ancestor of `path` get the change applied inside their
    /// value, so a later flush persists what the cache holds.
    pub fn absorb_remote(&mut self, path: &DocPath, value: Option<&Value>) {
        self.pending.retain(|(p, _)| !p.starts_with(path));

        let ancestors = self
            .pending
            .iter_mut()
            .filter(|entry| path.starts_with(&entry.0));
        for (ancestor, slot) in ancestors {
            let relative = DocPath::from_segments(&path.segments()[ancestor.segments().len()..]);
            match (slot.as_mut(), value) {
                (None, None) => {}
                (Some(base), None) => {
                    remove_value_at_path(base, &relative);
                }
                (base, Some(value)) => {
                    let mut base = base.map(std::mem::take).unwrap_or(Value::Null);
                    set_value_at_path(&mut base, &relative, value.clone());
                    *slot = Some(base);
                }
            }
        }
    }

    /// Number of pending writes.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Paths with pending writes, in application order.
    pub fn paths(&self) -> Vec<DocPath> {
        self.pending.iter().map(|(p, _)| p.clone()).collect()
    }

    /// Drops every pending write.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
