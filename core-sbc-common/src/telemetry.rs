//! Metric samples produced by a scrape.

use std::fmt;

/// How a sample's value evolves between scrapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Can go up or down.
    Gauge,
    /// Monotonically accumulating (e.g. sessions since startup).
    Counter,
}

impl MetricKind {
    /// Get the exposition name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unique identifier for a metric series within one scrape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    /// The metric name, without registry prefix.
    pub name: String,
    /// Label key-value pairs, sorted by key.
    pub labels: Vec<(String, String)>,
}

/// A single metric value emitted by a scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Metric name (e.g. "current_calls", "sofia_gateway_registered").
    pub name: String,

    /// Help text for the metric descriptor.
    pub help: &'static str,

    /// Gauge or counter.
    pub kind: MetricKind,

    /// The measured value.
    pub value: f64,

    /// Entity labels (profile, gateway, call leg, ...), kept sorted by key.
    pub labels: Vec<(String, String)>,
}

impl MetricSample {
    /// Create a gauge sample without labels.
    pub fn gauge(name: impl Into<String>, help: &'static str, value: f64) -> Self {
        Self::new(name, help, MetricKind::Gauge, value)
    }

    /// Create a counter sample without labels.
    pub fn counter(name: impl Into<String>, help: &'static str, value: f64) -> Self {
        Self::new(name, help, MetricKind::Counter, value)
    }

    /// Create a sample of the given kind without labels.
    pub fn new(name: impl Into<String>, help: &'static str, kind: MetricKind, value: f64) -> Self {
        Self {
            name: name.into(),
            help,
            kind,
            value,
            labels: Vec::new(),
        }
    }

    /// Add a label to this sample. An existing label with the same key is replaced.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.labels.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => {
                self.labels.push((key, value));
                self.labels.sort_by(|a, b| a.0.cmp(&b.0));
            }
        }
        self
    }

    /// Get the series identity of this sample.
    pub fn key(&self) -> SeriesKey {
        SeriesKey {
            name: self.name.clone(),
            labels: self.labels.clone(),
        }
    }
}
