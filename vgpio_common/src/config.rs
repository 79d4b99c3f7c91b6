//! Configuration loading and the service configuration schema.
//!
//! Every section of [`CoreConfig`] has defaults, so an empty file (or no
//! file at all) yields the reference deployment: 2 s reply timeout, no chip
//! limit, UDP on [`DEFAULT_LISTEN_ADDR`] with no peers.
//!
//! # Usage
//!
//! ```rust,no_run
//! use vgpio_common::config::{ConfigLoader, CoreConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = CoreConfig::load(Path::new("vgpio.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! service_name = "vgpio-core"
//! log_level = "debug"
//!
//! [engine]
//! reply_timeout_ms = 2000
//!
//! [lifecycle]
//! max_chips = 1
//!
//! [transport]
//! listen = "127.0.0.1:47100"
//! peers = ["127.0.0.1:47101"]
//! ```

use crate::consts::{
    DEFAULT_LISTEN_ADDR, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REPLY_TIMEOUT_MS,
    DEFAULT_STATUS_INTERVAL_MS, SERVICE_NAME,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-message tracing, including every reply dispatched.
    Trace,
    /// Per-request details.
    Debug,
    /// Chip lifecycle events.
    #[default]
    Info,
    /// Dropped messages, unresponsive bridge.
    Warn,
    /// Failures only.
    Error,
}

/// Fields common to every vgpio process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedConfig {
    /// Logging verbosity level.
    pub log_level: LogLevel,

    /// Instance identifier, used in logs and the status snapshot.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: SERVICE_NAME.to_string(),
        }
    }
}

/// Request/reply engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a caller waits for a bridge reply.
    pub reply_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT_MS,
        }
    }
}

impl EngineConfig {
    /// Reply timeout as a `Duration`.
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

/// Chip lifecycle settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Maximum number of simultaneously registered chips; unlimited if unset.
    pub max_chips: Option<usize>,
}

/// UDP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Local address the core binds.
    pub listen: String,

    /// Bridge addresses every outbound message is sent to.
    pub peers: Vec<String>,

    /// Receive poll interval of the service loop.
    pub poll_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN_ADDR.to_string(),
            peers: Vec::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl TransportConfig {
    /// Parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("transport.listen", &self.listen)
    }

    /// Parsed peer addresses.
    pub fn peer_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        self.peers
            .iter()
            .map(|p| parse_addr("transport.peers", p))
            .collect()
    }

    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Status snapshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// File the JSON snapshot is written to; disabled if unset.
    pub path: Option<PathBuf>,

    /// Snapshot interval.
    pub interval_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            path: None,
            interval_ms: DEFAULT_STATUS_INTERVAL_MS,
        }
    }
}

/// Complete configuration of the `vgpio_core` service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Common fields
    pub shared: SharedConfig,
    /// `[engine]`
    pub engine: EngineConfig,
    /// `[lifecycle]`
    pub lifecycle: LifecycleConfig,
    /// `[transport]`
    pub transport: TransportConfig,
    /// `[status]`
    pub status: StatusConfig,
}

impl CoreConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    /// - `reply_timeout_ms`, `poll_interval_ms` or `interval_ms` is zero
    /// - `max_chips` is zero
    /// - a transport address does not parse
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shared.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        if self.engine.reply_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "engine.reply_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.lifecycle.max_chips == Some(0) {
            return Err(ConfigError::ValidationError(
                "lifecycle.max_chips must be > 0 when set".to_string(),
            ));
        }
        if self.transport.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "transport.poll_interval_ms must be > 0".to_string(),
            ));
        }
        if self.status.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "status.interval_ms must be > 0".to_string(),
            ));
        }
        self.transport.listen_addr()?;
        self.transport.peer_addrs()?;
        Ok(())
    }
}

fn parse_addr(field: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::ValidationError(format!("{field}: '{value}': {e}")))
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
