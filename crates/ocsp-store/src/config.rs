//! Store configuration
//!
//! JSON configuration for the certificate-status store: where the database
//! lives, how many pooled connections to hold, and which digest algorithm
//! the `HASH` column uses. The digest choice is seeded into the `DBSCHEMA`
//! table on migration and read back from there afterwards, so every process
//! sharing the database agrees on it.

use ocsp_proto::hash::HashAlgo;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration of the certificate-status store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database connection URL.
    ///
    /// PostgreSQL (`postgres://...`) for deployments; SQLite
    /// (`sqlite::memory:` or `sqlite://path`) for tests and evaluation.
    pub database_url: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Digest algorithm for the `CERT.HASH` column, e.g. "SHA256" or
    /// "SHA3-256". Persisted in `DBSCHEMA` on first migration.
    #[serde(default = "default_certhash_algo")]
    pub certhash_algo: String,
}

fn default_max_connections() -> u32 {
    10
}

fn default_certhash_algo() -> String {
    "SHA256".to_string()
}

impl StoreConfig {
    /// Loads the configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        let config: StoreConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates field contents beyond what serde enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.is_empty() {
            return Err(ConfigError::Invalid("database_url must not be empty".into()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be at least 1".into()));
        }
        self.certhash_algo()?;
        Ok(())
    }

    /// The configured cert-hash algorithm as a catalogue variant.
    pub fn certhash_algo(&self) -> Result<HashAlgo, ConfigError> {
        HashAlgo::from_name(&self.certhash_algo)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
