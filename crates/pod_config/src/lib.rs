//! Configuration management for podsync
//!
//! This crate handles loading and validating `podsync.toml`

use pod_common::{PodError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory (set programmatically, not in TOML)
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// Sync settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Network identity settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Peer selection settings
    #[serde(default)]
    pub peers: PeersConfig,
}

/// Sync configuration ([sync])
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between scheduled passes, in seconds
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,

    /// Run a pass immediately at startup
    #[serde(default = "default_true")]
    pub run_at_startup: bool,

    /// Restart from a zero watermark at startup
    #[serde(default)]
    pub full_resync_at_startup: bool,

    /// Remote page size for incremental pulls
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Reject documents older than this many seconds
    #[serde(default = "default_max_past_delta")]
    pub max_past_delta_secs: u64,

    /// Reject documents more than this many seconds in the future
    #[serde(default = "default_max_future_delta")]
    pub max_future_delta_secs: u64,

    /// Retries per remote page fetch
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,

    /// Initial backoff between retries, in seconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,

    /// Per-request network timeout, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum concurrent (peer, action) sync tasks
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,
}

fn default_sync_interval() -> u64 {
    3600 * 4
}
fn default_page_size() -> usize {
    100
}
fn default_max_past_delta() -> u64 {
    3600 * 24 * 365
}
fn default_max_future_delta() -> u64 {
    600
}
fn default_retry_count() -> usize {
    3
}
fn default_retry_backoff() -> u64 {
    2
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_concurrent() -> usize {
    4
}
fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sync_interval(),
            run_at_startup: true,
            full_resync_at_startup: false,
            page_size: default_page_size(),
            max_past_delta_secs: default_max_past_delta(),
            max_future_delta_secs: default_max_future_delta(),
            retry_count: default_retry_count(),
            retry_backoff_secs: default_retry_backoff(),
            request_timeout_secs: default_request_timeout(),
            max_concurrent_tasks: default_max_concurrent(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

/// Network configuration ([network])
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Blockchain/network instance this pod belongs to
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub tls: bool,
}

fn default_currency() -> String {
    "g1".to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    9200
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            host: default_host(),
            port: default_port(),
            tls: false,
        }
    }
}

/// Peer selection configuration ([peers])
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PeersConfig {
    /// Only sync from these endpoints when non-empty ("host:port")
    #[serde(default)]
    pub include_endpoints: Vec<String>,

    /// Fallback endpoints used when discovery yields no match
    #[serde(default)]
    pub default_endpoints: Vec<String>,
}

impl Config {
    /// Load configuration from a data directory
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join("podsync.toml");

        if !config_path.exists() {
            return Ok(Self {
                data_dir: data_dir.to_path_buf(),
                sync: SyncConfig::default(),
                network: NetworkConfig::default(),
                peers: PeersConfig::default(),
            });
        }

        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| PodError::Config(format!("Failed to read config: {}", e)))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| PodError::Config(format!("Failed to parse config: {}", e)))?;

        config.data_dir = data_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants
    pub fn validate(&self) -> Result<()> {
        if self.network.currency.is_empty() {
            return Err(PodError::Config("currency cannot be empty".to_string()));
        }
        if self.sync.page_size == 0 {
            return Err(PodError::Config("page_size must be positive".to_string()));
        }
        if self.sync.max_concurrent_tasks == 0 {
            return Err(PodError::Config(
                "max_concurrent_tasks must be positive".to_string(),
            ));
        }
        for endpoint in self
            .peers
            .include_endpoints
            .iter()
            .chain(&self.peers.default_endpoints)
        {
            if !endpoint.contains(':') {
                return Err(PodError::Config(format!(
                    "endpoint '{}' must be host:port",
                    endpoint
                )));
            }
        }
        Ok(())
    }
}
