//! Configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration:
//!
//! ```toml
//! [matching]
//! max_distance = 25
//! max_results = 1000
//! panel = 37
//! store_timeout_ms = 10000
//!
//! [cache]
//! enabled = true
//! ttl_seconds = 3600
//! op_timeout_ms = 2000
//! retry_after_ms = 5000
//! max_entries = 10000
//!
//! [ingest]
//! chunk_size = 500
//! max_batch = 5000
//!
//! [export]
//! context_size = 5000
//! top_matches = 30
//! panel = 37
//!
//! [server]
//! address = "127.0.0.1"
//! port = 8080
//! request_timeout_seconds = 30
//! concurrency_limit = 100
//! body_limit_bytes = 20971520
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheSettings;
use crate::core::panel::PanelSize;
use crate::core::types::ErrorKind;
use crate::ingest::bulk::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_BATCH};
use crate::matching::engine::{MatchOptions, DEFAULT_MAX_DISTANCE, DEFAULT_MAX_RESULTS};
use crate::report::export::{ExportOptions, DEFAULT_CONTEXT_SIZE, DEFAULT_TOP_MATCHES};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInput
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub matching: MatchingConfig,
    pub cache: CacheConfig,
    pub ingest: IngestConfig,
    pub export: ExportConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub max_distance: u32,
    pub max_results: usize,
    pub panel: PanelSize,
    /// Deadline for each profile store call
    pub store_timeout_ms: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_distance: DEFAULT_MAX_DISTANCE,
            max_results: DEFAULT_MAX_RESULTS,
            panel: PanelSize::default(),
            store_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
    /// Deadline for each cache call; a timeout counts as unavailable
    pub op_timeout_ms: u64,
    /// Pause after a cache failure before trying again
    pub retry_after_ms: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 3600,
            op_timeout_ms: 2000,
            retry_after_ms: 5000,
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Profiles per store transaction
    pub chunk_size: usize,
    /// Largest accepted submission
    pub max_batch: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Matches fetched for rarity statistics
    pub context_size: usize,
    /// Matches listed in a report
    pub top_matches: usize,
    pub panel: PanelSize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            context_size: DEFAULT_CONTEXT_SIZE,
            top_matches: DEFAULT_TOP_MATCHES,
            panel: PanelSize::medium(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub request_timeout_seconds: u64,
    pub concurrency_limit: usize,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_seconds: 30,
            concurrency_limit: 100,
            body_limit_bytes: 20 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or holds
    /// out-of-range values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load the file when given, otherwise use defaults
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or holds out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.matching.max_results == 0 {
            return invalid("matching.max_results must be at least 1");
        }
        if self.matching.store_timeout_ms == 0 {
            return invalid("matching.store_timeout_ms must be at least 1");
        }
        if self.cache.ttl_seconds == 0 {
            return invalid("cache.ttl_seconds must be at least 1");
        }
        if self.cache.op_timeout_ms == 0 {
            return invalid("cache.op_timeout_ms must be at least 1");
        }
        if self.cache.max_entries == 0 {
            return invalid("cache.max_entries must be at least 1");
        }
        if self.ingest.chunk_size == 0 {
            return invalid("ingest.chunk_size must be at least 1");
        }
        if self.ingest.max_batch == 0 {
            return invalid("ingest.max_batch must be at least 1");
        }
        if self.export.context_size == 0 {
            return invalid("export.context_size must be at least 1");
        }
        if self.server.port == 0 {
            return invalid("server.port must be greater than 0");
        }
        if self.server.concurrency_limit == 0 {
            return invalid("server.concurrency_limit must be at least 1");
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.matching.store_timeout_ms)
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.cache.ttl_seconds),
            op_timeout: Duration::from_millis(self.cache.op_timeout_ms),
            retry_after: Duration::from_millis(self.cache.retry_after_ms),
        }
    }

    /// Match options seeded from the `[matching]` section
    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            max_distance: self.matching.max_distance,
            max_results: self.matching.max_results,
            panel: self.matching.panel,
            ..MatchOptions::default()
        }
    }

    /// Export options seeded from the `[export]` and `[matching]` sections
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            panel: Some(self.export.panel),
            max_distance: self.matching.max_distance,
            context_size: self.export.context_size,
            top_matches: self.export.top_matches,
            use_cache: self.cache.enabled,
        }
    }
}
