//! Store configuration.

use crate::retry::RetryConfig;
use std::time::Duration;
use tabdb_storage::BackendConfig;

/// Configuration for opening a [`crate::Store`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backend database, object store, version and connect timeout.
    pub backend: BackendConfig,

    /// Key under which the root document is persisted.
    pub root_key: String,

    /// Quiet period after the last mutation before pending writes flush.
    pub debounce: Duration,

    /// Maximum age of an untouched cache entry.
    pub cache_ttl: Duration,

    /// Maximum number of cache entries kept after eviction.
    pub max_cache_entries: usize,

    /// Retry behavior for backend operations.
    pub retry: RetryConfig,

    /// Whether to prune `null` and empty-string fields before persisting.
    pub compress_on_flush: bool,

    /// Name of the cross-instance broadcast channel.
    pub channel_name: String,

    /// Maximum length of the recent-projects list.
    pub recent_projects_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            root_key: "root".to_string(),
            debounce: Duration::from_millis(300),
            cache_ttl: Duration::from_secs(5 * 60),
            max_cache_entries: 100,
            retry: RetryConfig::default(),
            compress_on_flush: false,
            channel_name: "tabdb-sync".to_string(),
            recent_projects_limit: 10,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backend configuration.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the root document key.
    #[must_use]
    pub fn with_root_key(mut self, key: impl Into<String>) -> Self {
        self.root_key = key.into();
        self
    }

    /// Sets the debounce window.
    #[must_use]
    pub const fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    /// Sets the cache TTL.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the maximum number of cache entries.
    #[must_use]
    pub const fn with_max_cache_entries(mut self, max: usize) -> Self {
        self.max_cache_entries = max;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Enables or disables pruning of empty fields on flush.
    #[must_use]
    pub const fn compress_on_flush(mut self, value: bool) -> Self {
        self.compress_on_flush = value;
        self
    }

    /// Sets the broadcast channel name.
    #[must_use]
    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    /// Sets the recent-projects limit.
    #[must_use]
    pub const fn with_recent_projects_limit(mut self, limit: usize) -> Self {
        self.recent_projects_limit = limit;
        self
    }
}
