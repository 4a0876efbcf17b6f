//! Cluster configuration
//!
//! Supports YAML configuration files with section-based organization.
//! The library never reads configuration on its own; callers load a
//! [`ClusterConfig`], open their server handles, and pass both to
//! [`Cluster::from_config`](crate::Cluster::from_config).

use serde::{Deserialize, Serialize};

use crate::idgen::{DEFAULT_EPOCH_MS, DEFAULT_SHARD_BITS};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Number of logical shards
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,
    /// Physical servers in placement order (may repeat)
    #[serde(default)]
    pub servers: Vec<String>,
    /// Id layout
    #[serde(default)]
    pub id_gen: IdGenConfig,
    /// Fan-out defaults
    #[serde(default)]
    pub fan_out: FanOutConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            shard_count: default_shard_count(),
            servers: Vec::new(),
            id_gen: IdGenConfig::default(),
            fan_out: FanOutConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl ClusterConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to YAML file
    pub fn to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let yaml =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(path, yaml).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Apply an overlay; only fields set in `other` replace values here
    pub fn merge(&mut self, other: PartialClusterConfig) {
        if let Some(shard_count) = other.shard_count {
            self.shard_count = shard_count;
        }
        if let Some(servers) = other.servers {
            self.servers = servers;
        }
        if let Some(shard_bits) = other.id_gen.shard_bits {
            self.id_gen.shard_bits = shard_bits;
        }
        if let Some(epoch_ms) = other.id_gen.epoch_ms {
            self.id_gen.epoch_ms = epoch_ms;
        }
        if let Some(n) = other.fan_out.shard_concurrency {
            self.fan_out.shard_concurrency = n;
        }
        if let Some(level) = other.log.level {
            self.log.level = level;
        }
    }
}

/// Id layout configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGenConfig {
    /// Width of the shard field in bits
    #[serde(default = "default_shard_bits")]
    pub shard_bits: u32,
    /// Epoch in unix milliseconds
    #[serde(default = "default_epoch_ms")]
    pub epoch_ms: i64,
}

impl Default for IdGenConfig {
    fn default() -> Self {
        Self {
            shard_bits: default_shard_bits(),
            epoch_ms: default_epoch_ms(),
        }
    }
}

/// Fan-out configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutConfig {
    /// Shards of one server processed concurrently by `for_each_n_shards` callers
    #[serde(default = "default_shard_concurrency")]
    pub shard_concurrency: usize,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            shard_concurrency: default_shard_concurrency(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Configuration overlay
///
/// Same layout as [`ClusterConfig`] with every field optional. Fields left
/// out of the YAML stay `None` and leave the base untouched on
/// [`ClusterConfig::merge`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialClusterConfig {
    pub shard_count: Option<usize>,
    pub servers: Option<Vec<String>>,
    pub id_gen: PartialIdGenConfig,
    pub fan_out: PartialFanOutConfig,
    pub log: PartialLogConfig,
}

impl PartialClusterConfig {
    /// Load an overlay from YAML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Load an overlay from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialIdGenConfig {
    pub shard_bits: Option<u32>,
    pub epoch_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialFanOutConfig {
    pub shard_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialLogConfig {
    pub level: Option<String>,
}

// Default value functions

fn default_shard_count() -> usize {
    2048
}

fn default_shard_bits() -> u32 {
    DEFAULT_SHARD_BITS
}

fn default_epoch_ms() -> i64 {
    DEFAULT_EPOCH_MS
}

fn default_shard_concurrency() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
}
