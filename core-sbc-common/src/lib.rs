//! Core SBC Common Library
//!
//! This crate provides shared types and utilities for the Core SBC exporter:
//!
//! - [`telemetry`] - Metric data model (`MetricSample`, `MetricKind`, `SeriesKey`)
//! - [`config`] - Configuration loading (JSON5 format) and logging settings
//! - [`identity`] - Deployment identity attached to log records
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod identity;
pub mod telemetry;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use identity::DeploymentIdentity;
pub use telemetry::{MetricKind, MetricSample, SeriesKey};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Json` (default): Structured JSON format for log aggregation systems
/// - `LogFormat::Text`: Human-readable text format
///
/// `RUST_LOG` takes precedence over the configured level when set.
///
/// # Example
///
/// ```ignore
/// use core_sbc_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    config.validate()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Logging(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_current_span(true))
                .with(filter)
                .try_init()
                .map_err(|e| Error::Logging(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
