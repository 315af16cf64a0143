//! Prometheus exporter for Core SBC nodes.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use core_sbc_common::{DeploymentIdentity, LogFormat, init_tracing};
use tokio::sync::watch;
use tracing::{Instrument, error, info};

use core_sbc_exporter::{ExporterConfig, HttpServer, SbcCollector};

/// Prometheus exporter for Core SBC nodes.
#[derive(Parser, Debug)]
#[command(name = "core-sbc-exporter")]
#[command(about = "Export Core SBC event-socket status as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(short, long)]
    listen: Option<String>,

    /// Path of the metrics endpoint (overrides config).
    #[arg(long)]
    metrics_path: Option<String>,

    /// Event-socket target, e.g. tcp://localhost:8021 (overrides config).
    #[arg(short = 'u', long)]
    scrape_uri: Option<String>,

    /// Scrape timeout in milliseconds (overrides config).
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Event-socket password (overrides config).
    #[arg(short = 'P', long, env = "CORE_SBC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Also export per-call RTP statistics.
    #[arg(long)]
    rtp_enable: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (text, json).
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn apply(self, config: &mut ExporterConfig) {
        if let Some(listen) = self.listen {
            config.web.listen = listen;
        }
        if let Some(path) = self.metrics_path {
            config.web.path = path;
        }
        if let Some(uri) = self.scrape_uri {
            config.sbc.scrape_uri = uri;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.sbc.timeout_ms = timeout_ms;
        }
        if let Some(password) = self.password {
            config.sbc.password = password;
        }
        if self.rtp_enable {
            config.sbc.rtp_enable = true;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };
    args.apply(&mut config);
    config.validate()?;

    init_tracing(&config.logging)?;

    let identity = DeploymentIdentity::from_env();
    let span = identity.span();

    run(config).instrument(span).await
}

async fn run(config: ExporterConfig) -> anyhow::Result<()> {
    info!(config = ?config, "Starting Core SBC exporter");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let settings = Arc::new(config.sbc.settings());
    let collector = Arc::new(SbcCollector::new(config.sbc.target()?, settings.clone())?);
    let listen_addr = config.web.listen_addr()?;

    let http_server = HttpServer::new(
        collector.clone(),
        settings,
        &config.web.prefix,
        listen_addr,
        &config.web.path,
    );

    let http_task = tokio::spawn(
        async move {
            if let Err(e) = http_server.run(shutdown_rx).await {
                error!("HTTP server error: {}", e);
            }
        }
        .in_current_span(),
    );

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    let stats = collector.stats();
    info!(
        scrapes = stats.scrapes,
        failed_scrapes = stats.failed_scrapes,
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
