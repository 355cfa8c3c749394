//! Cart engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `COCOBROWN_DATA_DIR` - Directory for the stored cart (default: .cocobrown)
//! - `COCOBROWN_CART_TTL_DAYS` - Days a stored cart stays valid (default: 7)
//! - `COCOBROWN_CART_MAX_PAYLOAD_BYTES` - Largest cart payload written (default: 102400)
//! - `COCOBROWN_CATALOG_PATH` - JSON catalog replacing the built-in one
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;

use chrono::TimeDelta;
use thiserror::Error;

use crate::catalog::{CatalogError, ProductCatalog};
use crate::persistence::{DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_TTL_DAYS, PersistencePolicy};
use crate::storage::{FileStorage, StorageError};

const DEFAULT_DATA_DIR: &str = ".cocobrown";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Cart engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartConfig {
    /// Directory holding the stored cart files
    pub data_dir: PathBuf,
    /// Days a stored cart stays valid
    pub ttl_days: i64,
    /// Largest serialized cart accepted for a write
    pub max_payload_bytes: usize,
    /// Catalog file to use instead of the built-in catalog
    pub catalog_path: Option<PathBuf>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            ttl_days: DEFAULT_TTL_DAYS,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            catalog_path: None,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

impl CartConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let data_dir = PathBuf::from(env.get_or_default("COCOBROWN_DATA_DIR", DEFAULT_DATA_DIR));

        let ttl_days = env.parse_or("COCOBROWN_CART_TTL_DAYS", DEFAULT_TTL_DAYS)?;
        if ttl_days < 1 || TimeDelta::try_days(ttl_days).is_none() {
            return Err(invalid("COCOBROWN_CART_TTL_DAYS", "must be at least 1"));
        }

        let max_payload_bytes =
            env.parse_or("COCOBROWN_CART_MAX_PAYLOAD_BYTES", DEFAULT_MAX_PAYLOAD_BYTES)?;
        if max_payload_bytes == 0 {
            return Err(invalid(
                "COCOBROWN_CART_MAX_PAYLOAD_BYTES",
                "must be greater than 0",
            ));
        }

        Ok(Self {
            data_dir,
            ttl_days,
            max_payload_bytes,
            catalog_path: env.get_optional("COCOBROWN_CATALOG_PATH").map(PathBuf::from),
            sentry_dsn: env.get_optional("SENTRY_DSN"),
            sentry_environment: env.get_optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Retention and size limits derived from this configuration.
    #[must_use]
    pub fn policy(&self) -> PersistencePolicy {
        PersistencePolicy {
            ttl: TimeDelta::try_days(self.ttl_days)
                .unwrap_or_else(|| TimeDelta::days(DEFAULT_TTL_DAYS)),
            max_payload_bytes: self.max_payload_bytes,
        }
    }

    /// The configured catalog file, or the built-in catalog.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the catalog cannot be read or is invalid.
    pub fn load_catalog(&self) -> Result<ProductCatalog, CatalogError> {
        match &self.catalog_path {
            Some(path) => ProductCatalog::from_path(path),
            None => ProductCatalog::builtin(),
        }
    }

    /// Open file storage in the data directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the directory cannot be created.
    pub fn open_storage(&self) -> Result<FileStorage, StorageError> {
        FileStorage::new(&self.data_dir)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get an optional variable; blank values count as unset.
    fn get_optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn get_or_default(&self, key: &str, default: &str) -> String {
        self.get_optional(key)
            .unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable, falling back to `default` when unset.
    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get_optional(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| invalid(key, &e.to_string()))
        })
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidEnvVar(key.to_string(), reason.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<CartConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        CartConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, CartConfig::default());
        assert_eq!(config.data_dir, PathBuf::from(".cocobrown"));
        assert_eq!(config.policy(), PersistencePolicy::default());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("COCOBROWN_DATA_DIR", "/var/lib/cocobrown"),
            ("COCOBROWN_CART_TTL_DAYS", "14"),
            ("COCOBROWN_CART_MAX_PAYLOAD_BYTES", "2048"),
            ("COCOBROWN_CATALOG_PATH", "catalog.json"),
            ("SENTRY_DSN", "https://key@sentry.example/1"),
            ("SENTRY_ENVIRONMENT", "staging"),
        ])
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/cocobrown"));
        assert_eq!(config.policy().ttl, TimeDelta::days(14));
        assert_eq!(config.policy().max_payload_bytes, 2048);
        assert_eq!(config.catalog_path, Some(PathBuf::from("catalog.json")));
        assert_eq!(config.sentry_environment.as_deref(), Some("staging"));
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = load(&[("COCOBROWN_CART_TTL_DAYS", " "), ("SENTRY_DSN", "")]).unwrap();
        assert_eq!(config.ttl_days, DEFAULT_TTL_DAYS);
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let err = load(&[("COCOBROWN_CART_TTL_DAYS", "0")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid environment variable COCOBROWN_CART_TTL_DAYS: must be at least 1"
        );
    }

    #[test]
    fn test_rejects_unparseable_values() {
        assert!(matches!(
            load(&[("COCOBROWN_CART_TTL_DAYS", "a week")]),
            Err(ConfigError::InvalidEnvVar(key, _)) if key == "COCOBROWN_CART_TTL_DAYS"
        ));
        assert!(matches!(
            load(&[("COCOBROWN_CART_MAX_PAYLOAD_BYTES", "-1")]),
            Err(ConfigError::InvalidEnvVar(key, _)) if key == "COCOBROWN_CART_MAX_PAYLOAD_BYTES"
        ));
        assert!(load(&[("COCOBROWN_CART_MAX_PAYLOAD_BYTES", "0")]).is_err());
    }

    #[test]
    fn test_load_catalog_defaults_to_builtin() {
        let catalog = CartConfig::default().load_catalog().unwrap();
        assert!(!catalog.is_empty());
    }

    #[test]
    fn test_open_storage_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = CartConfig {
            data_dir: dir.path().join("nested"),
            ..CartConfig::default()
        };
        let storage = config.open_storage().unwrap();
        assert!(storage.base().is_dir());
    }
}
