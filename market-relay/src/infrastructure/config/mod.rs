//! Configuration loading for the market data relay
//!
//! Supports JSON configuration files for:
//! - Listener settings (address, per-connection queue, drain timeout)
//! - Broadcast schedule (interval, worker count, overlap policy)
//! - Order book fetcher (endpoint, depth, request timeout)
//!
//! Every field has a default, so `{}` is a valid configuration.

use crate::application::OverlapPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {error}")]
    Io { path: String, error: String },
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub fetcher: FetcherConfig,
}

impl RelayConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reject settings the relay cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast.workers == 0 {
            return Err(ConfigError::Invalid(
                "broadcast.workers must be at least 1".to_string(),
            ));
        }
        if self.broadcast.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "broadcast.interval_ms must be positive".to_string(),
            ));
        }
        if self.server.send_buffer == 0 {
            return Err(ConfigError::Invalid(
                "server.send_buffer must be at least 1".to_string(),
            ));
        }
        if self.fetcher.base_url.is_empty() {
            return Err(ConfigError::Invalid(
                "fetcher.base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Frames buffered per connection before new ones are dropped
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,
    /// How long a closing connection may spend flushing its queue
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9002
}

fn default_send_buffer() -> usize {
    1024
}

fn default_drain_timeout_ms() -> u64 {
    2000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            send_buffer: default_send_buffer(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Broadcast schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub overlap: OverlapPolicy,
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_workers() -> usize {
    num_cpus::get().max(2)
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            workers: default_workers(),
            overlap: OverlapPolicy::default(),
        }
    }
}

impl BroadcastConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Order book fetcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Levels per side; venue default when absent
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "https://test.deribit.com/api/v2".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            depth: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
