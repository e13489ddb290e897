//! # Lattice Config - Configuration Management
//!
//! Handles configuration loading from files and environment variables for
//! the LatticeDB storage core.

use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend identifier understood by the storage factory.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// When true every mutation fails with a read-only error.
    #[serde(default)]
    pub read_only: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            read_only: false,
        }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Capacity of the per-subscription emission channel. When a subscription
    /// falls this many revisions behind it is disconnected.
    #[serde(default = "default_watch_buffer_length")]
    pub buffer_length: usize,

    /// Delay between empty polls of the transaction space.
    #[serde(default = "default_watch_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            buffer_length: default_watch_buffer_length(),
            poll_interval_ms: default_watch_poll_interval_ms(),
        }
    }
}

fn default_watch_buffer_length() -> usize {
    128
}

fn default_watch_poll_interval_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Estimated predicate size, in bytes, above which the query builder
    /// shards a query into smaller segments.
    #[serde(default = "default_split_at_estimated_query_size")]
    pub split_at_estimated_query_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            split_at_estimated_query_size: default_split_at_estimated_query_size(),
        }
    }
}

fn default_split_at_estimated_query_size() -> usize {
    65536
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Whether object definition names must carry a `prefix/` segment.
    #[serde(default)]
    pub prefix_required: bool,
}

#[allow(clippy::derivable_impls)]
impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            prefix_required: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// One of `text`, `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Load configuration with layered precedence: defaults → file → env vars.
///
/// The file source is optional; a missing file leaves the serde defaults in
/// place. Environment variables use the `LATTICE` prefix with `__` as the
/// section separator, e.g. `LATTICE_WATCH__BUFFER_LENGTH=16`.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let builder = ConfigBuilder::builder().add_source(File::from(path.as_ref()).required(false));

    let builder =
        builder.add_source(Environment::with_prefix("LATTICE").separator("__").try_parsing(true));

    let config = builder.build()?;
    config.try_deserialize()
}

/// Convenience wrapper around [`load`] that logs failures and falls back to
/// defaults instead of propagating an error.
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Config {
    match load(path.as_ref()) {
        Ok(config) => {
            tracing::info!("configuration loaded from {:?}", path.as_ref());
            config
        }
        Err(e) => {
            tracing::warn!(
                "failed to load config from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.backend, "memory");
        assert!(!config.storage.read_only);
        assert_eq!(config.watch.buffer_length, 128);
        assert_eq!(config.watch.poll_interval_ms, 100);
        assert_eq!(config.query.split_at_estimated_query_size, 65536);
        assert!(!config.schema.prefix_required);
    }

    #[test]
    fn test_watch_poll_interval_conversion() {
        let watch = WatchConfig {
            buffer_length: 1,
            poll_interval_ms: 250,
        };
        assert_eq!(watch.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = load("/nonexistent/lattice.toml").unwrap();
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.watch.buffer_length, 128);
    }
}
