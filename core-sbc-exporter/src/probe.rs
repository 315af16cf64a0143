//! Multi-target probing: one fresh collector and registry per request.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::debug;

use crate::collector::{SbcCollector, ScrapeSettings};
use crate::target::{SCHEME_PREFIX, Target};

/// Body of the 400 answer to a probe without a target.
pub const MISSING_TARGET: &str = "'target' query param not provided, but required.";

/// A probe that could not be scraped.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Missing or unusable `target` parameter.
    #[error("{0}")]
    BadRequest(String),

    /// The request was valid but the exporter could not serve it.
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ProbeError {
    fn into_response(self) -> Response {
        let status = match self {
            ProbeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProbeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            [("content-type", "text/plain; charset=utf-8")],
            format!("{}\n", self),
        )
            .into_response()
    }
}

/// Prefix `tcp://` to a target given without a scheme.
pub fn normalize_target(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw.contains("://") {
        raw.to_string()
    } else {
        format!("{}{}", SCHEME_PREFIX, raw)
    }
}

/// Scrape the target named by a `/probe` request and encode the result.
pub async fn probe(
    target: Option<&str>,
    settings: Arc<ScrapeSettings>,
    prefix: &str,
) -> Result<String, ProbeError> {
    let raw = target
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ProbeError::BadRequest(MISSING_TARGET.to_string()))?;

    let target: Target = normalize_target(raw)
        .parse()
        .map_err(|e| ProbeError::BadRequest(format!("invalid 'target' query param: {}", e)))?;

    let collector = SbcCollector::new(target, settings)
        .map_err(|e| ProbeError::Internal(format!("cannot build collector: {}", e)))?;

    debug!(sbc = %collector.target(), "Probing target");
    scrape(&collector, prefix).await
}

/// Run one scrape of `collector` and encode it.
pub async fn scrape(collector: &SbcCollector, prefix: &str) -> Result<String, ProbeError> {
    collector
        .scrape()
        .await
        .render(prefix)
        .map_err(|e| ProbeError::Internal(format!("cannot encode metrics: {}", e)))
}
