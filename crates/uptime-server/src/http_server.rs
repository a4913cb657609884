//! Metrics listener: endpoint exposition, self metrics and health probes.

use crate::exposition::{self, CONTENT_TYPE};
use crate::health::{self, HEALTHZ_PATH, HealthState, READYZ_PATH};
use crate::metrics::MetricsRegistry;
use crate::registry::EndpointRegistry;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use common::{Error, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Content type of the prometheus-client OpenMetrics encoding
const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Clone)]
struct MetricsState {
    registry: Arc<EndpointRegistry>,
    metrics: Arc<MetricsRegistry>,
}

/// HTTP server for the metrics listener
pub struct MetricsServer {
    state: MetricsState,
    health: HealthState,
    path: String,
    internal_path: String,
}

/// Describe why `path` and `internal_path` cannot share the metrics router
pub fn route_conflict(path: &str, internal_path: &str) -> Option<String> {
    if path == internal_path {
        return Some(format!("metrics path and internal path are both {}", path));
    }
    [path, internal_path]
        .into_iter()
        .find(|p| *p == HEALTHZ_PATH || *p == READYZ_PATH)
        .map(|p| format!("metrics route {} collides with the health route", p))
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// Fails when the two metric paths collide with each other or with the
    /// health routes.
    pub fn new(
        registry: Arc<EndpointRegistry>,
        metrics: Arc<MetricsRegistry>,
        service_name: Arc<str>,
        path: impl Into<String>,
        internal_path: impl Into<String>,
    ) -> Result<Self> {
        let path = path.into();
        let internal_path = internal_path.into();
        if let Some(reason) = route_conflict(&path, &internal_path) {
            return Err(Error::other(reason));
        }

        Ok(Self {
            health: HealthState {
                registry: registry.clone(),
                service_name,
            },
            state: MetricsState { registry, metrics },
            path,
            internal_path,
        })
    }

    /// Build the router
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.path, get(exposition_handler))
            .route(&self.internal_path, get(internal_metrics_handler))
            .merge(health::router(self.health.clone()))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(self.state.clone())
    }

    /// Serve on `listener` until `cancel` fires
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> std::io::Result<()> {
        let app = self.router();
        self.serve_router(app, listener, cancel).await
    }

    /// Serve an already built router on `listener` until `cancel` fires
    pub async fn serve_router(
        &self,
        app: Router,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(
                listen_addr = %addr,
                path = %self.path,
                internal_path = %self.internal_path,
                "Metrics server listening"
            );
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
    }
}

/// Handler for the endpoint exposition
async fn exposition_handler(State(state): State<MetricsState>) -> Response {
    let endpoints = state.registry.list().await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, CONTENT_TYPE)],
        exposition::render(&endpoints),
    )
        .into_response()
}

/// Handler for the server's own metrics
async fn internal_metrics_handler(State(state): State<MetricsState>) -> Response {
    match state.metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)],
            buffer,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}
