//! Service configuration
//!
//! Loaded from environment variables with prefix `KOE` and separator `__`,
//! after a `.env` file in the working directory (if any) has been applied:
//!
//! | Variable                   | Default      |
//! |----------------------------|--------------|
//! | `KOE__STORE__BACKEND`      | `memory`     |
//! | `KOE__STORE__DATA_DIR`     | `data/saker` |
//! | `KOE__STORE__DATABASE_URL` | unset        |
//! | `KOE__LOG__LEVEL`          | `info`       |
//! | `KOE__LOG__JSON`           | `false`      |

use config::{Config, Environment, Source};
use serde::{Deserialize, Serialize};

use infra_store::StoreConfig;

use crate::error::ServiceError;

const ENV_PREFIX: &str = "KOE";
const ENV_SEPARATOR: &str = "__";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KoeConfig {
    pub store: StoreConfig,
    pub log: LoggingConfig,
}

impl KoeConfig {
    /// Loads configuration from `.env` and the process environment
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Configuration` if a variable has the wrong shape
    pub fn from_env() -> Result<Self, ServiceError> {
        dotenvy::dotenv().ok();
        Self::from_source(Self::environment())
    }

    /// Loads configuration from a single source
    pub fn from_source<S>(source: S) -> Result<Self, ServiceError>
    where
        S: Source + Send + Sync + 'static,
    {
        let config = Config::builder().add_source(source).build()?.try_deserialize()?;
        Ok(config)
    }

    /// The environment source with the `KOE__` naming scheme
    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infra_store::StoreBackend;
    use std::path::PathBuf;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        KoeConfig::environment().source(Some(map))
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = KoeConfig::from_source(env(&[])).unwrap();
        assert_eq!(config, KoeConfig::default());
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_nested_variables() {
        let config = KoeConfig::from_source(env(&[
            ("KOE__STORE__BACKEND", "file"),
            ("KOE__STORE__DATA_DIR", "/var/lib/koe"),
            ("KOE__LOG__LEVEL", "debug"),
            ("KOE__LOG__JSON", "true"),
        ]))
        .unwrap();

        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.store.data_dir, PathBuf::from("/var/lib/koe"));
        assert_eq!(config.log.level, "debug");
        assert!(config.log.json);
    }

    #[test]
    fn test_postgres_settings() {
        let config = KoeConfig::from_source(env(&[
            ("KOE__STORE__BACKEND", "postgres"),
            ("KOE__STORE__DATABASE_URL", "postgres://koe@localhost/koe"),
            ("KOE__STORE__MAX_CONNECTIONS", "4"),
        ]))
        .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(config.store.database_url.as_deref(), Some("postgres://koe@localhost/koe"));
        assert_eq!(config.store.max_connections, 4);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result = KoeConfig::from_source(env(&[("KOE__STORE__BACKEND", "csv")]));
        assert!(matches!(result, Err(ServiceError::Configuration(_))));
    }
}
