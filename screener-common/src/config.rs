//! Configuration management for the screener service.
//!
//! The service reads a single configuration file at `~/.screener/config.json`.
//! A missing file is not an error; every field has a default.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (SCREENER_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `SCREENER_HOST` → server.host
//! - `SCREENER_PORT` → server.port
//! - `SCREENER_LOG_LEVEL` → observability.log_level
//! - `SCREENER_CHARTINK_ENDPOINT` → chartink.endpoint

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, ResultExt};

/// Default screener endpoint on chartink.com.
pub const DEFAULT_CHARTINK_ENDPOINT: &str = "https://chartink.com/screener/process";

/// Screener served by `/download` when no `screener_name` is given.
pub const DEFAULT_SCREENER: &str = "episodic_pivot";

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".screener"),
        |dirs| dirs.home_dir().join(".screener"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Server
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Default "127.0.0.1" (local only).
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4480
}

// ============================================================================
// Chartink
// ============================================================================

/// External screener service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartinkConfig {
    /// Endpoint serving both the CSRF page (GET) and the scan (POST).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request timeout in seconds. Unset means the HTTP client default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Screener id used by the CSV download when none is requested.
    #[serde(default = "default_screener")]
    pub default_screener: String,
}

impl Default for ChartinkConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: None,
            default_screener: default_screener(),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_CHARTINK_ENDPOINT.into()
}

fn default_screener() -> String {
    DEFAULT_SCREENER.into()
}

// ============================================================================
// Catalog
// ============================================================================

/// Screener catalog source.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogConfig {
    /// JSON catalog file replacing the built-in screener set.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets clamped to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub chartink: ChartinkConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration, apply environment overrides and validate.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("SCREENER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SCREENER_PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid SCREENER_PORT"),
            }
        }
        if let Some(level) = lookup("SCREENER_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(endpoint) = lookup("SCREENER_CHARTINK_ENDPOINT") {
            self.chartink.endpoint = endpoint;
        }
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("server.port must be non-zero".into()));
        }

        let endpoint = url::Url::parse(&self.chartink.endpoint).map_err(|e| {
            Error::Config(format!(
                "chartink.endpoint {:?} is not a valid URL: {}",
                self.chartink.endpoint, e
            ))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "chartink.endpoint must use http or https, got {}",
                endpoint.scheme()
            )));
        }

        if self.chartink.timeout_secs == Some(0) {
            return Err(Error::Config(
                "chartink.timeout_secs must be non-zero; omit it for no timeout".into(),
            ));
        }

        if self.chartink.default_screener.trim().is_empty() {
            return Err(Error::Config("chartink.default_screener is empty".into()));
        }

        Ok(())
    }

    /// Socket address string for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
