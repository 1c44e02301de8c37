//! Backend adapter configuration.

use std::time::Duration;

/// Configuration for the backend adapter.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Name of the database opened on the engine.
    pub db_name: String,
    /// Name of the object store holding documents.
    pub store_name: String,
    /// Database version requested on open. Bumping it runs the upgrade step.
    pub version: u32,
    /// How long a connection attempt may take before failing.
    pub connect_timeout: Duration,
}

impl BackendConfig {
    /// Creates a configuration for the given database and store.
    pub fn new(db_name: impl Into<String>, store_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            store_name: store_name.into(),
            version: 1,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the database version.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new("tabdb", "app_state")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = BackendConfig::default();
        assert_eq!(config.db_name, "tabdb");
        assert_eq!(config.store_name, "app_state");
        assert_eq!(config.version, 1);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn builder_pattern() {
        let config = BackendConfig::new("erd", "docs")
            .with_version(3)
            .with_connect_timeout(Duration::from_millis(250));

        assert_eq!(config.db_name, "erd");
        assert_eq!(config.store_name, "docs");
        assert_eq!(config.version, 3);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
    }
}
