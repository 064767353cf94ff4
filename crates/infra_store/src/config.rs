//! Store configuration
//!
//! Selects the persistence backend and its connection settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Persistence backend for case logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local logs; lost on restart
    #[default]
    Memory,
    /// One JSON document per case under `data_dir`
    File,
    /// PostgreSQL tables `koe_streams` / `koe_events`
    Postgres,
}

/// Configuration for the event store
///
/// # Example
///
/// ```rust
/// use infra_store::{StoreBackend, StoreConfig};
///
/// let config = StoreConfig::postgres("postgres://localhost/koe")
///     .max_connections(20)
///     .run_migrations(true);
/// assert_eq!(config.backend, StoreBackend::Postgres);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Directory for the file backend
    pub data_dir: PathBuf,
    /// PostgreSQL connection string for the postgres backend
    pub database_url: Option<String>,
    /// Maximum number of pooled connections
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection
    pub connect_timeout_secs: u64,
    /// Create the tables on startup if they are missing
    pub run_migrations: bool,
}

impl StoreConfig {
    /// In-memory store
    pub fn memory() -> Self {
        Self::default()
    }

    /// JSON file store rooted at `data_dir`
    pub fn file(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: StoreBackend::File,
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// PostgreSQL store at `url`
    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            backend: StoreBackend::Postgres,
            database_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Sets the maximum number of pooled connections
    ///
    /// # Arguments
    ///
    /// * `max` - Maximum connection count (default: 10)
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets whether tables are created on startup
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            data_dir: PathBuf::from("data/saker"),
            database_url: None,
            max_connections: 10,
            connect_timeout_secs: 30,
            run_migrations: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = StoreConfig::postgres("postgres://test")
            .max_connections(50)
            .run_migrations(false);

        assert_eq!(config.backend, StoreBackend::Postgres);
        assert_eq!(config.database_url.as_deref(), Some("postgres://test"));
        assert_eq!(config.max_connections, 50);
        assert!(!config.run_migrations);
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_backend_names() {
        let backend: StoreBackend = serde_json::from_str("\"file\"").unwrap();
        assert_eq!(backend, StoreBackend::File);
    }
}
