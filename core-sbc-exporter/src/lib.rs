//! Prometheus exporter for Core SBC nodes.
//!
//! Each scrape opens one event-socket connection to the SBC, authenticates,
//! runs a fixed set of status commands and turns their text output into
//! metrics. Nothing is cached between scrapes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ HTTP server │────>│  Collector  │────>│ ESL client  │────>│     SBC     │
//! │ /metrics    │     │  (scrape)   │     │ (tcp://...) │     │ :8021       │
//! │ /probe      │<────│   parser    │<────│             │<────│             │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! core-sbc-exporter --config config.json5
//! core-sbc-exporter -u tcp://10.0.0.5:8021 -P ClueCon --rtp-enable
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod error;
pub mod esl;
pub mod http;
pub mod mapping;
pub mod parser;
pub mod probe;
pub mod target;

#[cfg(test)]
mod test_support;

pub use collector::{SbcCollector, ScrapeReport, ScrapeSettings};
pub use config::ExporterConfig;
pub use error::ScrapeError;
pub use http::HttpServer;
pub use target::Target;
