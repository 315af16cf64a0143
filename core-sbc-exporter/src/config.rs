//! Configuration for the Core SBC exporter.

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use core_sbc_common::{LoggingConfig, load_config, parse_config};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collector::ScrapeSettings;
use crate::mapping::is_valid_prefix;
use crate::target::Target;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Load(#[from] core_sbc_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// SBC connection settings.
    #[serde(default)]
    pub sbc: SbcConfig,

    /// HTTP endpoint settings.
    #[serde(default)]
    pub web: WebConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Event-socket connection settings for the default target.
#[derive(Clone, Serialize, Deserialize)]
pub struct SbcConfig {
    /// Target scraped on the metrics path (default: "tcp://localhost:8021").
    #[serde(default = "default_scrape_uri")]
    pub scrape_uri: String,

    /// Event-socket password (default: "ClueCon").
    #[serde(default = "default_password")]
    pub password: String,

    /// Budget for one scrape in milliseconds (default: 5000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Query per-call RTP statistics.
    #[serde(default)]
    pub rtp_enable: bool,
}

fn default_scrape_uri() -> String {
    "tcp://localhost:8021".to_string()
}

fn default_password() -> String {
    "ClueCon".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for SbcConfig {
    fn default() -> Self {
        Self {
            scrape_uri: default_scrape_uri(),
            password: default_password(),
            timeout_ms: default_timeout_ms(),
            rtp_enable: false,
        }
    }
}

impl fmt::Debug for SbcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SbcConfig")
            .field("scrape_uri", &self.scrape_uri)
            .field("password", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .field("rtp_enable", &self.rtp_enable)
            .finish()
    }
}

impl SbcConfig {
    /// The default target.
    pub fn target(&self) -> Result<Target, ConfigError> {
        self.scrape_uri.parse().map_err(|e| {
            ConfigError::Validation(format!("Invalid scrape_uri {:?}: {}", self.scrape_uri, e))
        })
    }

    /// Settings shared by every scrape.
    pub fn settings(&self) -> ScrapeSettings {
        ScrapeSettings {
            password: self.password.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            rtp_enable: self.rtp_enable,
        }
    }
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Address to listen on (default: "0.0.0.0:9282").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path of the default-target metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Metric name prefix (default: "core_sbc").
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_listen() -> String {
    "0.0.0.0:9282".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_prefix() -> String {
    "core_sbc".to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            prefix: default_prefix(),
        }
    }
}

impl WebConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|_| {
            ConfigError::Validation(format!("Invalid listen address: {}", self.listen))
        })
    }
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ExporterConfig = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sbc.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "timeout_ms must be > 0".to_string(),
            ));
        }

        self.sbc.target()?;
        self.web.listen_addr()?;

        if !self.web.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if self.web.path == "/probe" || self.web.path == "/" || self.web.path == "/health" {
            return Err(ConfigError::Validation(format!(
                "Metrics path {} is reserved",
                self.web.path
            )));
        }

        if !is_valid_prefix(&self.web.prefix) {
            return Err(ConfigError::Validation(format!(
                "Invalid metric prefix: {:?}",
                self.web.prefix
            )));
        }

        self.logging
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        Ok(())
    }
}
