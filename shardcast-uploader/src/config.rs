//! Uploader configuration
//!
//! Loaded from a TOML file, then overridden from `SHARDCAST_*` environment
//! variables.

use crate::retry::{Backoff, RetryPolicy};
use serde::{Deserialize, Serialize};
use shardcast_core::erasure::ErasureConfig;
use shardcast_core::segment::validate_segment_size;
use shardcast_core::{DATA_SHARDS, DEFAULT_SEGMENT_SIZE, PARITY_SHARDS};
use shardcast_network::{TransportConfig, DEFAULT_MAX_FRAME_LEN};
use shardcast_storage::StorageConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Bytes a push frame carries on top of the fragment itself
const FRAME_OVERHEAD: usize = 1024;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Complete uploader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Size of the encoding worker pool
    #[serde(default = "default_encode_workers")]
    pub encode_workers: usize,

    #[serde(default)]
    pub segment: SegmentSettings,

    #[serde(default)]
    pub erasure: ErasureSettings,

    #[serde(default)]
    pub scratch: ScratchSettings,

    #[serde(default)]
    pub placement: PlacementSettings,

    #[serde(default)]
    pub distribution: DistributionSettings,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            encode_workers: default_encode_workers(),
            segment: SegmentSettings::default(),
            erasure: ErasureSettings::default(),
            scratch: ScratchSettings::default(),
            placement: PlacementSettings::default(),
            distribution: DistributionSettings::default(),
        }
    }
}

impl UploaderConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: UploaderConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    /// Apply `SHARDCAST_*` environment variable overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(size) = parsed("SHARDCAST_SEGMENT_SIZE") {
            self.segment.size = size as usize;
        }
        if let Some(n) = parsed("SHARDCAST_DATA_SHARDS") {
            self.erasure.data_shards = n as usize;
        }
        if let Some(n) = parsed("SHARDCAST_PARITY_SHARDS") {
            self.erasure.parity_shards = n as usize;
        }
        if let Some(dir) = lookup("SHARDCAST_SCRATCH_DIR") {
            self.scratch.dir = PathBuf::from(dir);
        }
        if let Some(ms) = parsed("SHARDCAST_BLOCK_INTERVAL_MS") {
            self.placement.block_interval_ms = ms;
        }
        if let Some(n) = parsed("SHARDCAST_PLACEMENT_ATTEMPTS") {
            self.placement.max_attempts = n as u32;
        }
        if let Some(n) = parsed("SHARDCAST_MAX_PARALLEL_NODES") {
            self.distribution.max_parallel_nodes = n as usize;
        }
        if let Some(n) = parsed("SHARDCAST_ENCODE_WORKERS") {
            self.encode_workers = n as usize;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_segment_size(self.segment.size)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        let erasure = self.erasure_config()?;
        if self.segment.size % erasure.data_shards != 0 {
            return Err(ConfigError::ValidationError(format!(
                "segment size {} is not a multiple of {} data shards",
                self.segment.size, erasure.data_shards
            )));
        }

        let fragment_size = erasure.shard_size(self.segment.size);
        if fragment_size + FRAME_OVERHEAD > self.distribution.max_frame_len {
            return Err(ConfigError::ValidationError(format!(
                "max frame length {} cannot carry {}-byte fragments",
                self.distribution.max_frame_len, fragment_size
            )));
        }

        if self.placement.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "placement.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.encode_workers == 0 {
            return Err(ConfigError::ValidationError(
                "encode_workers must be at least 1".to_string(),
            ));
        }
        if self.distribution.max_parallel_nodes == 0 {
            return Err(ConfigError::ValidationError(
                "distribution.max_parallel_nodes must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Erasure parameters
    pub fn erasure_config(&self) -> Result<ErasureConfig, ConfigError> {
        ErasureConfig::new(self.erasure.data_shards, self.erasure.parity_shards)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Placement poll policy
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.placement.max_attempts,
            interval: self.placement.block_interval(),
            backoff: self.placement.backoff,
        }
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig::new(&self.scratch.dir).with_sync_writes(self.scratch.sync_writes)
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_secs(self.distribution.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.distribution.request_timeout_secs),
            max_frame_len: self.distribution.max_frame_len,
        }
    }
}

/// Segmenting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSettings {
    /// Segment size in bytes
    #[serde(default = "default_segment_size")]
    pub size: usize,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        Self {
            size: default_segment_size(),
        }
    }
}

fn default_segment_size() -> usize {
    DEFAULT_SEGMENT_SIZE
}

/// Erasure coding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErasureSettings {
    #[serde(default = "default_data_shards")]
    pub data_shards: usize,

    #[serde(default = "default_parity_shards")]
    pub parity_shards: usize,
}

impl Default for ErasureSettings {
    fn default() -> Self {
        Self {
            data_shards: default_data_shards(),
            parity_shards: default_parity_shards(),
        }
    }
}

fn default_data_shards() -> usize {
    DATA_SHARDS
}

fn default_parity_shards() -> usize {
    PARITY_SHARDS
}

/// Scratch storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchSettings {
    #[serde(default = "default_scratch_dir")]
    pub dir: PathBuf,

    /// fsync scratch objects before a write returns
    #[serde(default = "default_true")]
    pub sync_writes: bool,
}

impl Default for ScratchSettings {
    fn default() -> Self {
        Self {
            dir: default_scratch_dir(),
            sync_writes: true,
        }
    }
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("./shardcast_scratch")
}

fn default_true() -> bool {
    true
}

/// Placement poll settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementSettings {
    /// Ledger block interval; the poll waits at least this long per attempt
    #[serde(default = "default_block_interval_ms")]
    pub block_interval_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub backoff: Backoff,

    /// Bound on a single order query
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

impl Default for PlacementSettings {
    fn default() -> Self {
        Self {
            block_interval_ms: default_block_interval_ms(),
            max_attempts: default_max_attempts(),
            backoff: Backoff::Fixed,
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

impl PlacementSettings {
    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.block_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

fn default_block_interval_ms() -> u64 {
    6_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_poll_timeout_ms() -> u64 {
    10_000
}

/// Fragment distribution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionSettings {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Nodes sent to at the same time
    #[serde(default = "default_max_parallel_nodes")]
    pub max_parallel_nodes: usize,

    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            max_parallel_nodes: default_max_parallel_nodes(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_parallel_nodes() -> usize {
    4
}

fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

fn default_encode_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = UploaderConfig::default();
        assert_eq!(config.segment.size, 16 * 1024 * 1024);
        assert_eq!(config.erasure.data_shards, 2);
        assert_eq!(config.erasure.parity_shards, 1);
        assert_eq!(config.placement.max_attempts, 3);
        assert_eq!(config.placement.block_interval(), Duration::from_secs(6));
        assert!(config.encode_workers >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_transport_config_follows_distribution() {
        let mut config = UploaderConfig::default();
        config.distribution.connect_timeout_secs = 2;
        config.distribution.request_timeout_secs = 9;
        config.distribution.max_frame_len = 8 * 1024 * 1024;

        let transport = config.transport_config();
        assert_eq!(transport.connect_timeout, Duration::from_secs(2));
        assert_eq!(transport.request_timeout, Duration::from_secs(9));
        assert_eq!(transport.max_frame_len, 8 * 1024 * 1024);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            encode_workers = 2

            [segment]
            size = 4194304

            [erasure]
            data_shards = 4
            parity_shards = 2

            [scratch]
            dir = "/tmp/shardcast"
            sync_writes = false

            [placement]
            block_interval_ms = 250
            max_attempts = 5
            backoff = "linear"
        "#;

        let config: UploaderConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.encode_workers, 2);
        assert_eq!(config.segment.size, 4 * 1024 * 1024);
        assert_eq!(config.erasure_config().unwrap().total_shards(), 6);
        assert_eq!(config.scratch.dir, PathBuf::from("/tmp/shardcast"));
        assert!(!config.scratch.sync_writes);

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.interval, Duration::from_millis(250));
        assert_eq!(policy.backoff, Backoff::Linear);

        // Sections left out keep their defaults
        assert_eq!(config.distribution.max_parallel_nodes, 4);
        assert_eq!(config.placement.poll_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("shardcast.toml");
        std::fs::write(&path, "[segment]\nsize = 1048576\n").unwrap();

        let config = UploaderConfig::from_file(&path).unwrap();
        assert_eq!(config.segment.size, 1024 * 1024);

        std::fs::write(&path, "[segment]\nsize = 10\n").unwrap();
        assert!(matches!(
            UploaderConfig::from_file(&path),
            Err(ConfigError::ValidationError(_))
        ));

        std::fs::write(&path, "[segment\n").unwrap();
        assert!(matches!(
            UploaderConfig::from_file(&path),
            Err(ConfigError::ParseError(_))
        ));

        let fallback = UploaderConfig::load_or_default(dir.path().join("missing.toml"));
        assert_eq!(fallback.segment.size, DEFAULT_SEGMENT_SIZE);
    }

    #[test]
    fn test_validation() {
        let mut config = UploaderConfig::default();
        config.placement.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = UploaderConfig::default();
        config.erasure.data_shards = 0;
        assert!(config.validate().is_err());

        let mut config = UploaderConfig::default();
        config.segment.size = 4 * 1024 * 1024 + 1;
        assert!(config.validate().is_err());

        let mut config = UploaderConfig::default();
        config.distribution.max_frame_len = 1024 * 1024;
        assert!(config.validate().is_err());

        let mut config = UploaderConfig::default();
        config.encode_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SHARDCAST_SEGMENT_SIZE", "2097152"),
            ("SHARDCAST_PARITY_SHARDS", "2"),
            ("SHARDCAST_SCRATCH_DIR", "/var/tmp/scratch"),
            ("SHARDCAST_PLACEMENT_ATTEMPTS", "7"),
            ("SHARDCAST_ENCODE_WORKERS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = UploaderConfig::default()
            .with_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.segment.size, 2 * 1024 * 1024);
        assert_eq!(config.erasure.parity_shards, 2);
        assert_eq!(config.erasure.data_shards, 2);
        assert_eq!(config.scratch.dir, PathBuf::from("/var/tmp/scratch"));
        assert_eq!(config.placement.max_attempts, 7);
        // Unparseable values are ignored
        assert_eq!(config.encode_workers, UploaderConfig::default().encode_workers);
    }

    #[test]
    fn test_serializes_to_toml() {
        let config = UploaderConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed: UploaderConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.segment.size, config.segment.size);
        assert_eq!(parsed.placement.backoff, Backoff::Fixed);
    }
}
