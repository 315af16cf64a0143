//! Scrape orchestration: one connection, one query set, one report.
//!
//! A scrape always yields `up` and `scrape_duration_seconds`, whatever
//! happens on the wire. Connection and authentication failures end the
//! scrape with `up 0`; a failing status query only drops its own samples.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use core_sbc_common::{MetricKind, MetricSample, SeriesKey};
use parking_lot::Mutex;
use prometheus_client::collector::Collector;
use prometheus_client::encoding::{DescriptorEncoder, EncodeMetric, MetricEncoder};
use prometheus_client::metrics::counter::ConstCounter;
use prometheus_client::metrics::gauge::ConstGauge;
use prometheus_client::registry::Registry;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Result, ScrapeError};
use crate::esl::EslClient;
use crate::mapping;
use crate::parser::{self, CommandKind};
use crate::target::Target;

/// Connection parameters shared by every scrape.
#[derive(Clone, PartialEq, Eq)]
pub struct ScrapeSettings {
    /// Event-socket password.
    pub password: String,
    /// Budget for a whole scrape, connect included.
    pub timeout: Duration,
    /// Also query per-call RTP statistics.
    pub rtp_enable: bool,
}

impl fmt::Debug for ScrapeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrapeSettings")
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("rtp_enable", &self.rtp_enable)
            .finish()
    }
}

/// Errors from building a collector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectorError {
    #[error("scrape timeout must be greater than zero")]
    ZeroTimeout,
}

/// Progress of a single scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
    Idle,
    Connecting,
    Authenticating,
    Querying,
    Done,
}

impl ScrapeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeState::Idle => "idle",
            ScrapeState::Connecting => "connecting",
            ScrapeState::Authenticating => "authenticating",
            ScrapeState::Querying => "querying",
            ScrapeState::Done => "done",
        }
    }
}

impl fmt::Display for ScrapeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a scrape ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeOutcome {
    /// Connected and authenticated.
    pub success: bool,
    /// Wall time of the whole scrape.
    pub duration: Duration,
    /// Stage that ended the scrape early, if any.
    pub failed_stage: Option<ScrapeState>,
    /// Error text of the failed stage.
    pub error: Option<String>,
}

/// Cumulative scrape counters of one collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeStats {
    pub scrapes: u64,
    pub failed_scrapes: u64,
}

/// Everything one scrape produced, ready to be registered and encoded.
#[derive(Debug, Clone)]
pub struct ScrapeReport {
    pub outcome: ScrapeOutcome,
    /// Status samples, one per series.
    pub samples: Vec<MetricSample>,
    pub stats: ScrapeStats,
}

impl ScrapeReport {
    /// Samples emitted by every scrape, successful or not.
    pub fn scrape_samples(&self) -> Vec<MetricSample> {
        vec![
            MetricSample::gauge(
                "up",
                "Whether the last scrape of the SBC was able to connect and authenticate.",
                if self.outcome.success { 1.0 } else { 0.0 },
            ),
            MetricSample::gauge(
                "scrape_duration_seconds",
                "Duration of the last scrape of the SBC.",
                self.outcome.duration.as_secs_f64(),
            ),
            MetricSample::counter(
                "exporter_scrapes",
                "Scrapes performed by this collector.",
                self.stats.scrapes as f64,
            ),
            MetricSample::counter(
                "exporter_failed_scrapes",
                "Scrapes that could not connect or authenticate.",
                self.stats.failed_scrapes as f64,
            ),
        ]
    }

    /// Encode the report in the OpenMetrics text format under `prefix`.
    pub fn render(self, prefix: &str) -> std::result::Result<String, fmt::Error> {
        let mut registry = Registry::with_prefix(prefix);
        registry.register_collector(Box::new(self));

        let mut body = String::new();
        prometheus_client::encoding::text::encode(&mut body, &registry)?;
        Ok(body)
    }
}

impl Collector for ScrapeReport {
    fn encode(&self, mut encoder: DescriptorEncoder) -> std::result::Result<(), fmt::Error> {
        let builtin = self.scrape_samples();

        let mut families: BTreeMap<String, Vec<&MetricSample>> = BTreeMap::new();
        for sample in builtin.iter().chain(self.samples.iter()) {
            families
                .entry(mapping::export_name(sample))
                .or_default()
                .push(sample);
        }

        for (name, samples) in &families {
            let Some(first) = samples.first() else {
                continue;
            };
            let mut metric_encoder = encoder.encode_descriptor(
                name,
                first.help,
                None,
                mapping::metric_type(first.kind),
            )?;

            if let [single] = samples.as_slice()
                && single.labels.is_empty()
            {
                encode_value(first.kind, single.value, metric_encoder)?;
                continue;
            }

            for sample in samples.iter().filter(|s| s.kind == first.kind) {
                let labels = mapping::export_labels(sample);
                encode_value(
                    first.kind,
                    sample.value,
                    metric_encoder.encode_family(&labels)?,
                )?;
            }
        }

        Ok(())
    }
}

fn encode_value(
    kind: MetricKind,
    value: f64,
    encoder: MetricEncoder<'_>,
) -> std::result::Result<(), fmt::Error> {
    match kind {
        MetricKind::Gauge => ConstGauge::new(value).encode(encoder),
        MetricKind::Counter => ConstCounter::new(value).encode(encoder),
    }
}

/// Scrapes one SBC.
pub struct SbcCollector {
    target: Target,
    settings: Arc<ScrapeSettings>,
    stats: Mutex<ScrapeStats>,
}

impl SbcCollector {
    /// Create a collector bound to `target`.
    pub fn new(
        target: Target,
        settings: Arc<ScrapeSettings>,
    ) -> std::result::Result<Self, CollectorError> {
        if settings.timeout.is_zero() {
            return Err(CollectorError::ZeroTimeout);
        }

        Ok(Self {
            target,
            settings,
            stats: Mutex::new(ScrapeStats::default()),
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Cumulative counters so far.
    pub fn stats(&self) -> ScrapeStats {
        *self.stats.lock()
    }

    /// Run one scrape. Never fails: problems are reported in the outcome.
    pub async fn scrape(&self) -> ScrapeReport {
        let start = Instant::now();
        let deadline = start + self.settings.timeout;
        let mut merged = BTreeMap::new();

        let result = self.session(deadline, &mut merged).await;
        let duration = start.elapsed();

        let outcome = match result {
            Ok(()) => {
                debug!(
                    sbc = %self.target,
                    duration_ms = duration.as_millis() as u64,
                    samples = merged.len(),
                    "Scrape completed"
                );
                ScrapeOutcome {
                    success: true,
                    duration,
                    failed_stage: None,
                    error: None,
                }
            }
            Err((stage, e)) => {
                warn!(
                    sbc = %self.target,
                    stage = %stage,
                    error = %e,
                    "Scrape failed"
                );
                ScrapeOutcome {
                    success: false,
                    duration,
                    failed_stage: Some(stage),
                    error: Some(e.to_string()),
                }
            }
        };

        let stats = {
            let mut stats = self.stats.lock();
            stats.scrapes += 1;
            if !outcome.success {
                stats.failed_scrapes += 1;
            }
            *stats
        };

        ScrapeReport {
            outcome,
            samples: merged.into_values().collect(),
            stats,
        }
    }

    /// Connect, authenticate and query; the connection is closed on every
    /// path out.
    async fn session(
        &self,
        deadline: Instant,
        merged: &mut BTreeMap<SeriesKey, MetricSample>,
    ) -> std::result::Result<(), (ScrapeState, ScrapeError)> {
        let mut state = ScrapeState::Connecting;
        let mut client = EslClient::connect(&self.target, remaining(deadline))
            .await
            .map_err(|e| (state, e))?;

        state = ScrapeState::Authenticating;
        if let Err(e) = client
            .authenticate(&self.settings.password, remaining(deadline))
            .await
        {
            client.close().await;
            return Err((state, e));
        }

        state = ScrapeState::Querying;
        debug!(sbc = %self.target, state = %state, "Authenticated");
        self.query_all(&mut client, deadline, merged).await;

        client.close().await;
        debug!(sbc = %self.target, state = %ScrapeState::Done, "Connection closed");
        Ok(())
    }

    async fn query_all(
        &self,
        client: &mut EslClient<TcpStream>,
        deadline: Instant,
        merged: &mut BTreeMap<SeriesKey, MetricSample>,
    ) {
        for kind in CommandKind::BASELINE {
            let result = query(client, kind.command(), deadline)
                .await
                .and_then(|body| parser::parse(*kind, &body).map_err(ScrapeError::from));
            match result {
                Ok(samples) => merge(merged, samples),
                Err(e) => {
                    self.query_failed(kind.command(), &e);
                    if e.desynchronizes() {
                        return;
                    }
                }
            }
        }

        if self.settings.rtp_enable {
            self.query_media(client, deadline, merged).await;
        }
    }

    async fn query_media(
        &self,
        client: &mut EslClient<TcpStream>,
        deadline: Instant,
        merged: &mut BTreeMap<SeriesKey, MetricSample>,
    ) {
        let channels = CommandKind::Channels;
        let legs = match query(client, channels.command(), deadline)
            .await
            .and_then(|body| parser::parse(channels, &body).map_err(ScrapeError::from))
        {
            Ok(legs) => legs,
            Err(e) => {
                self.query_failed(channels.command(), &e);
                return;
            }
        };

        let uuids: Vec<String> = legs
            .iter()
            .filter_map(|s| s.labels.iter().find(|(k, _)| k == "uuid"))
            .map(|(_, uuid)| uuid.clone())
            .collect();
        merge(merged, legs);

        for uuid in uuids {
            let enable = format!("uuid_set_media_stats {}", uuid);
            let dump = format!("{} {} json", CommandKind::MediaStats.command(), uuid);

            let result = match query(client, &enable, deadline).await {
                Ok(_) => query(client, &dump, deadline)
                    .await
                    .and_then(|body| {
                        parser::parse(CommandKind::MediaStats, &body).map_err(ScrapeError::from)
                    })
                    .map_err(|e| (dump.as_str(), e)),
                Err(e) => Err((enable.as_str(), e)),
            };

            match result {
                Ok(samples) => merge(merged, samples),
                Err((command, e)) => {
                    self.query_failed(command, &e);
                    if e.desynchronizes() {
                        return;
                    }
                }
            }
        }
    }

    fn query_failed(&self, command: &str, error: &ScrapeError) {
        warn!(
            sbc = %self.target,
            query = command,
            error = %error,
            "Query failed"
        );
    }
}

impl fmt::Debug for SbcCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SbcCollector")
            .field("target", &self.target.to_string())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Run one `api` command within what is left of the scrape budget.
async fn query(
    client: &mut EslClient<TcpStream>,
    command: &str,
    deadline: Instant,
) -> Result<String> {
    let left = remaining(deadline);
    if left.is_zero() {
        return Err(ScrapeError::Timeout(command.to_string()));
    }
    client.api(command, left).await
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Merge samples by series identity, later samples winning.
fn merge(merged: &mut BTreeMap<SeriesKey, MetricSample>, samples: Vec<MetricSample>) {
    for sample in samples {
        merged.insert(sample.key(), sample);
    }
}
