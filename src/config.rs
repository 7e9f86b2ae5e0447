//! Configuration management for Sluice.
//!
//! Settings are read once at startup from an optional YAML file, overridden by
//! `SLUICE_`-prefixed environment variables, validated, and then handed to each
//! component explicitly. There is no hot reload.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::http::HeaderName;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SluiceError};

/// Longest counting window or cooldown accepted. Store TTLs beyond this are
/// out of range for the memory clock and rejected by Redis.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Main configuration for the Sluice service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SluiceConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Admission limits
    pub limits: LimitsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Which counter store backs the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    Memory,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Deadline for a single store call in milliseconds, 0 disables it
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// The per-call store deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_timeout_ms() -> u64 {
    500
}

/// Admission limits. Both request limits are mandatory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Requests per window for callers identified by network address
    pub ip_limit: u64,

    /// Requests per window for callers presenting a credential
    pub token_limit: u64,

    /// Counting window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// How long a block marker lives once an identifier goes over its limit
    #[serde(default = "default_block_time_secs")]
    pub block_time_secs: u64,

    /// Request header carrying the API credential
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
}

impl LimitsConfig {
    pub fn new(ip_limit: u64, token_limit: u64) -> Self {
        Self {
            ip_limit,
            token_limit,
            window_ms: default_window_ms(),
            block_time_secs: default_block_time_secs(),
            api_key_header: default_api_key_header(),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.block_time_secs)
    }

    /// The credential header as a typed header name.
    pub fn credential_header(&self) -> Result<HeaderName> {
        HeaderName::try_from(self.api_key_header.as_str()).map_err(|e| {
            SluiceError::Config(format!(
                "invalid limits.api_key_header '{}': {}",
                self.api_key_header, e
            ))
        })
    }
}

fn default_window_ms() -> u64 {
    1000
}

fn default_block_time_secs() -> u64 {
    60
}

fn default_api_key_header() -> String {
    "API_KEY".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SluiceConfig {
    /// Load configuration from an optional file plus `SLUICE_*` environment variables.
    ///
    /// Nested keys use `__` as separator, e.g. `SLUICE_LIMITS__IP_LIMIT=10`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("SLUICE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: SluiceConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: SluiceConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.limits.window_ms == 0 {
            return Err(SluiceError::Config(
                "limits.window_ms must be greater than zero".to_string(),
            ));
        }
        if self.limits.block_time_secs == 0 {
            return Err(SluiceError::Config(
                "limits.block_time_secs must be greater than zero".to_string(),
            ));
        }
        if self.limits.window() > MAX_TTL {
            return Err(SluiceError::Config(format!(
                "limits.window_ms must be at most {}",
                MAX_TTL.as_millis()
            )));
        }
        if self.limits.cooldown() > MAX_TTL {
            return Err(SluiceError::Config(format!(
                "limits.block_time_secs must be at most {}",
                MAX_TTL.as_secs()
            )));
        }
        self.limits.credential_header()?;
        if self.store.backend == StoreBackend::Redis && self.store.redis_url.trim().is_empty() {
            return Err(SluiceError::Config(
                "store.redis_url is required for the redis backend".to_string(),
            ));
        }
        Ok(())
    }
}
