//! Mapping from parsed samples to Prometheus names, labels and types.

use core_sbc_common::{MetricKind, MetricSample};
use prometheus_client::metrics::MetricType;

/// Sanitize a metric name to be Prometheus-compatible.
///
/// Metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`. Invalid characters
/// become underscores, runs of underscores collapse into one, and a leading
/// digit gets an underscore in front of it.
pub fn sanitize_metric_name(name: &str) -> String {
    let result = replace_invalid(name, |c| c.is_ascii_alphanumeric() || c == '_' || c == ':');

    match result.chars().next() {
        None => "unnamed".to_string(),
        Some(first) if first.is_ascii_digit() => format!("_{}", result),
        Some(_) => result,
    }
}

/// Sanitize a label name to be Prometheus-compatible.
///
/// Label names must match `[a-zA-Z_][a-zA-Z0-9_]*`; names starting with `__`
/// are reserved and get a `z` in front.
pub fn sanitize_label_name(name: &str) -> String {
    let result = replace_invalid(name, |c| c.is_ascii_alphanumeric() || c == '_');

    match result.chars().next() {
        None => "label".to_string(),
        Some(first) if first.is_ascii_digit() => format!("_{}", result),
        Some(_) if name.starts_with("__") => format!("z__{}", result.trim_start_matches('_')),
        Some(_) => result,
    }
}

/// Replace characters rejected by `valid` with single underscores and trim
/// trailing underscores.
fn replace_invalid(name: &str, valid: impl Fn(char) -> bool) -> String {
    let mut result = String::with_capacity(name.len() + 1);
    let mut last_was_underscore = false;

    for c in name.chars() {
        let c = if valid(c) { c } else { '_' };
        if c == '_' {
            if !last_was_underscore {
                result.push('_');
            }
            last_was_underscore = true;
        } else {
            result.push(c);
            last_was_underscore = false;
        }
    }

    while result.ends_with('_') {
        result.pop();
    }
    result
}

/// Whether a registry prefix is usable as-is.
pub fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && sanitize_metric_name(prefix) == prefix
}

/// The OpenMetrics type of a sample kind.
pub fn metric_type(kind: MetricKind) -> MetricType {
    match kind {
        MetricKind::Gauge => MetricType::Gauge,
        MetricKind::Counter => MetricType::Counter,
    }
}

/// Metric name as registered (counters get `_total` appended by the encoder).
pub fn export_name(sample: &MetricSample) -> String {
    sanitize_metric_name(&sample.name)
}

/// Labels of a sample with Prometheus-compatible names, sorted by name.
pub fn export_labels(sample: &MetricSample) -> Vec<(String, String)> {
    let mut labels: Vec<(String, String)> = sample
        .labels
        .iter()
        .map(|(k, v)| (sanitize_label_name(k), v.clone()))
        .collect();
    labels.sort_by(|a, b| a.0.cmp(&b.0));
    labels
}
