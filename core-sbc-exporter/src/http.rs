//! HTTP server for the metrics, probe and landing endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::collector::{SbcCollector, ScrapeSettings};
use crate::probe;

/// Content type of every metrics answer.
pub const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    collector: Arc<SbcCollector>,
    settings: Arc<ScrapeSettings>,
    prefix: Arc<str>,
    metrics_path: Arc<str>,
}

#[derive(Debug, Deserialize)]
struct ProbeParams {
    target: Option<String>,
}

/// Create the HTTP router.
fn create_router(state: AppState) -> Router {
    let metrics_path = state.metrics_path.to_string();

    Router::new()
        .route("/", get(index_handler))
        .route(&metrics_path, get(metrics_handler))
        .route("/probe", get(probe_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn metrics_response(result: Result<String, probe::ProbeError>) -> Response {
    match result {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", OPENMETRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Handler for the metrics path: scrape of the configured SBC.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    metrics_response(probe::scrape(&state.collector, &state.prefix).await)
}

/// Handler for `/probe?target=...`.
async fn probe_handler(
    State(state): State<AppState>,
    Query(params): Query<ProbeParams>,
) -> Response {
    metrics_response(
        probe::probe(
            params.target.as_deref(),
            state.settings.clone(),
            &state.prefix,
        )
        .await,
    )
}

async fn index_handler(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>Core SBC Exporter</title></head>\n\
         <body>\n\
         <h1>Core SBC Exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         <p><a href=\"/probe?target={target}\">Probe {target}</a></p>\n\
         </body>\n\
         </html>\n",
        path = state.metrics_path,
        target = state.collector.target(),
    ))
}

async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// HTTP server configuration.
pub struct HttpServer {
    state: AppState,
    listen_addr: SocketAddr,
}

impl HttpServer {
    /// Create a new HTTP server serving `collector` on the metrics path and
    /// ad-hoc targets on `/probe`.
    pub fn new(
        collector: Arc<SbcCollector>,
        settings: Arc<ScrapeSettings>,
        prefix: &str,
        listen_addr: SocketAddr,
        metrics_path: &str,
    ) -> Self {
        Self {
            state: AppState {
                collector,
                settings,
                prefix: Arc::from(prefix),
                metrics_path: Arc::from(metrics_path),
            },
            listen_addr,
        }
    }

    /// Bind the listen address and serve until the shutdown signal is received.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until the shutdown signal is received.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        info!(
            addr = %addr,
            path = %self.state.metrics_path,
            "HTTP server listening"
        );

        let router = create_router(self.state);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::target::Target;
    use crate::test_support::{FakeSbc, PASSWORD, closed_port};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    fn make_state(target: Target, metrics_path: &str) -> AppState {
        let settings = Arc::new(ScrapeSettings {
            password: PASSWORD.to_string(),
            timeout: Duration::from_secs(2),
            rtp_enable: false,
        });
        AppState {
            collector: Arc::new(SbcCollector::new(target, settings.clone()).unwrap()),
            settings,
            prefix: Arc::from("core_sbc"),
            metrics_path: Arc::from(metrics_path),
        }
    }

    async fn fetch(router: Router, uri: &str) -> (StatusCode, String, String) {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .map(|v| v.to_str().unwrap().to_string())
            .unwrap_or_default();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let sbc = FakeSbc::builder().start().await;
        let router = create_router(make_state(sbc.target(), "/metrics"));

        let (status, content_type, body) = fetch(router, "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, OPENMETRICS_CONTENT_TYPE);
        assert!(body.contains("core_sbc_up 1"));
        assert!(body.contains("core_sbc_sofia_gateway_registered{gateway=\"carrier-a\",profile=\"external\"} 1"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint_target_down() {
        let target = Target::new("127.0.0.1", closed_port().await);
        let router = create_router(make_state(target, "/metrics"));

        let (status, _, body) = fetch(router, "/metrics").await;

        // An unreachable SBC is reported in the body, not the status code.
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("core_sbc_up 0"));
    }

    #[tokio::test]
    async fn test_probe_endpoint() {
        let sbc = FakeSbc::builder().start().await;
        let router = create_router(make_state(Target::new("127.0.0.1", 1), "/metrics"));

        let uri = format!("/probe?target={}", sbc.uri().trim_start_matches("tcp://"));
        let (status, content_type, body) = fetch(router, &uri).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, OPENMETRICS_CONTENT_TYPE);
        assert!(body.contains("core_sbc_up 1"));
    }

    #[tokio::test]
    async fn test_probe_endpoint_missing_target() {
        let router = create_router(make_state(Target::new("127.0.0.1", 1), "/metrics"));

        let (status, _, body) = fetch(router.clone(), "/probe").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.trim(), probe::MISSING_TARGET);

        let (status, _, _) = fetch(router, "/probe?target=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_probe_endpoint_bad_target() {
        let router = create_router(make_state(Target::new("127.0.0.1", 1), "/metrics"));

        let (status, _, _) = fetch(router, "/probe?target=sbc%3A99999").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_index_and_health() {
        let router = create_router(make_state(Target::new("10.0.0.5", 8021), "/metrics"));

        let (status, _, body) = fetch(router.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Core SBC Exporter"));
        assert!(body.contains("href=\"/metrics\""));

        let (status, _, body) = fetch(router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "healthy\n");
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let sbc = FakeSbc::builder().start().await;
        let router = create_router(make_state(sbc.target(), "/sbc/metrics"));

        let (status, _, _) = fetch(router.clone(), "/sbc/metrics").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = fetch(router, "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
