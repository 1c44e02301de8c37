//! TTL- and size-bounded document cache.
//!
//! Entries are stamped on every touch. Entries older than the TTL are purged
//! lazily, when looked up or when stats are taken. After every insert the
//! oldest entries are purged until the cache is back under its size limit.
//! Pinned keys are never evicted.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

/// A cached value and the last time it was touched.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached value.
    pub value: Value,
    /// Last read or write of the entry.
    pub last_touched: Instant,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Live entries.
    pub entries: usize,
    /// Configured maximum.
    pub max_entries: usize,
    /// Configured TTL.
    pub ttl: Duration,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that missed or found an expired entry.
    pub misses: u64,
    /// Entries removed by TTL or size eviction.
    pub evictions: u64,
    /// Keys currently pinned, sorted.
    pub pinned: Vec<String>,
}

/// The in-memory cache of persisted documents.
#[derive(Debug)]
pub struct DocumentCache {
    entries: HashMap<String, CacheEntry>,
    pinned: HashSet<String>,
    ttl: Duration,
    max_entries: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl DocumentCache {
    /// Creates an empty cache. `max_entries` is clamped to at least 1.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            pinned: HashSet::new(),
            ttl,
            max_entries: max_entries.max(1),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn is_expired(&self, key: &str, entry: &CacheEntry, now: Instant) -> bool {
        !self.pinned.contains(key) && now.duration_since(entry.last_touched) > self.ttl
    }

    /// Purges `key` if it has expired. Returns true if a live entry remains.
    fn check_live(&mut self, key: &str) -> bool {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) => self.is_expired(key, entry, now),
            None => {
                self.misses += 1;
                return false;
            }
        };

        if expired {
            self.entries.remove(key);
            self.evictions += 1;
            self.misses += 1;
            tracing::trace!(key, "cache entry expired");
            return false;
        }

        self.hits += 1;
        true
    }

    /// Looks up and touches an entry.
    pub fn get(&mut self, key: &str) -> Option<&Value> {
        self.get_mut(key).map(|v| &*v)
    }

    /// Looks up and touches an entry for in-place mutation.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        if !self.check_live(key) {
            return None;
        }
        let entry = self.entries.get_mut(key)?;
        entry.last_touched = Instant::now();
        Some(&mut entry.value)
    }

    /// Returns true if a live entry exists, without touching it.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .is_some_and(|entry| !self.is_expired(key, entry, now))
    }

    /// Inserts or replaces an entry, then enforces the size limit.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                last_touched: Instant::now(),
            },
        );
        self.enforce_capacity();
    }

    /// Refreshes an entry's timestamp.
    pub fn touch(&mut self, key: &str) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_touched = Instant::now();
        }
    }

    /// Removes an entry.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Excludes a key from eviction.
    pub fn pin(&mut self, key: &str) {
        self.pinned.insert(key.to_string());
    }

    /// Makes a key evictable again and refreshes it, so a long-pinned entry
    /// does not expire the moment it is released.
    pub fn unpin(&mut self, key: &str) {
        if self.pinned.remove(key) {
            self.touch(key);
        }
    }

    /// Returns true if the key is pinned.
    pub fn is_pinned(&self, key: &str) -> bool {
        self.pinned.contains(key)
    }

    /// Removes every expired, unpinned entry. Returns the number removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, entry)| self.is_expired(key, entry, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.remove(key);
        }
        self.evictions += expired.len() as u64;
        expired.len()
    }

    /// Evicts the oldest unpinned entries until the size limit holds.
    /// Returns the number removed.
    pub fn enforce_capacity(&mut self) -> usize {
        if self.entries.len() <= self.max_entries {
            return 0;
        }

        let mut candidates: Vec<(Instant, String)> = self
            .entries
            .iter()
            .filter(|(key, _)| !self.pinned.contains(*key))
            .map(|(key, entry)| (entry.last_touched, key.clone()))
            .collect();
        candidates.sort();

        let excess = self.entries.len() - self.max_entries;
        let mut removed = 0;
        for (_, key) in candidates.into_iter().take(excess) {
            self.entries.remove(&key);
            removed += 1;
        }
        self.evictions += removed as u64;
        if removed > 0 {
            tracing::debug!(removed, "cache over capacity, evicted oldest entries");
        }
        removed
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry. Pins are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Purges expired entries and returns statistics.
    pub fn stats(&mut self) -> CacheStats {
        self.purge_expired();
        let mut pinned: Vec<String> = self.pinned.iter().cloned().collect();
        pinned.sort();
        CacheStats {
            entries: self.entries.len(),
            max_entries: self.max_entries,
            ttl: self.ttl,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            pinned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn get_touches_and_counts_hits() {
        let mut cache = DocumentCache::new(Duration::from_secs(60), 10);
        cache.insert("root", json!({"a": 1}));

        assert_eq!(cache.get("root"), Some(&json!({"a": 1})));
        assert_eq!(cache.get("missing"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_purged_on_lookup() {
        let mut cache = DocumentCache::new(Duration::from_secs(10), 10);
        cache.insert("a", json!(1));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!cache.contains("a"));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn touch_extends_lifetime() {
        let mut cache = DocumentCache::new(Duration::from_secs(10), 10);
        cache.insert("a", json!(1));

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(cache.get("a").is_some());
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(cache.get("a").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_absent_from_stats() {
        let mut cache = DocumentCache::new(Duration::from_secs(5), 10);
        cache.insert("a", json!(1));
        cache.insert("b", json!(2));

        tokio::time::advance(Duration::from_secs(3)).await;
        cache.touch("b");
        tokio::time::advance(Duration::from_secs(3)).await;

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert!(cache.contains("b"));
        assert!(!cache.contains("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_evicts_oldest_first() {
        let mut cache = DocumentCache::new(Duration::from_secs(600), 3);
        for key in ["a", "b", "c"] {
            cache.insert(key, json!(key));
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        // Refresh "a" so "b" becomes the oldest
        cache.touch("a");
        tokio::time::advance(Duration::from_millis(10)).await;

        cache.insert("d", json!("d"));
        assert_eq!(cache.len(), 3);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
    }

    #[tokio::test(start_paused = true)]
    async fn size_never_exceeds_max_after_eviction() {
        let mut cache = DocumentCache::new(Duration::from_secs(600), 5);
        for i in 0..50 {
            cache.insert(format!("k{i}"), json!(i));
            tokio::time::advance(Duration::from_millis(1)).await;
            assert!(cache.len() <= 5);
        }
        assert_eq!(cache.stats().evictions, 45);
    }

    #[tokio::test(start_paused = true)]
    async fn pinned_entry_survives_ttl_and_capacity() {
        let mut cache = DocumentCache::new(Duration::from_secs(5), 2);
        cache.insert("root", json!({}));
        cache.pin("root");

        tokio::time::advance(Duration::from_secs(30)).await;
        cache.insert("x", json!(1));
        tokio::time::advance(Duration::from_millis(1)).await;
        cache.insert("y", json!(2));

        assert!(cache.contains("root"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("root").is_some());
        assert_eq!(cache.stats().pinned, vec!["root".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn unpin_refreshes_entry() {
        let mut cache = DocumentCache::new(Duration::from_secs(5), 10);
        cache.insert("root", json!({}));
        cache.pin("root");
        tokio::time::advance(Duration::from_secs(30)).await;

        cache.unpin("root");
        assert!(!cache.is_pinned("root"));
        assert!(cache.contains("root"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!cache.contains("root"));
    }

    #[test]
    fn max_entries_clamped() {
        let mut cache = DocumentCache::new(Duration::from_secs(5), 0);
        assert_eq!(cache.stats().max_entries, 1);
    }
}
