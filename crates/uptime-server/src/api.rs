//! REST API and main HTTP router.

use crate::exposition::{CONTENT_TYPE, UNAVAILABLE_BODY};
use crate::fanout::FanOut;
use crate::health::{self, HealthState};
use crate::live::live_ws_handler;
use crate::metrics::MetricsRegistry;
use crate::registry::EndpointRegistry;
use crate::scheduler::Scheduler;
use crate::types::{Endpoint, RegisterEndpoint};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::path::Path as FsPath;
use std::sync::Arc;
use thiserror::Error;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use validator::{Validate, ValidationErrors};

/// API error mapped to a JSON `{"error": ...}` response
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("endpoint not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),
}

impl From<ValidationErrors> for ApiError {
    fn from(err: ValidationErrors) -> Self {
        ApiError::Invalid(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::Invalid(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Invalid(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Shared state of the main router
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<EndpointRegistry>,
    pub scheduler: Scheduler,
    pub fanout: Arc<FanOut>,
    pub metrics: Option<Arc<MetricsRegistry>>,
    pub service_name: Arc<str>,
}

impl AppState {
    fn health(&self) -> HealthState {
        HealthState {
            registry: self.registry.clone(),
            service_name: self.service_name.clone(),
        }
    }

    async fn update_endpoint_count(&self) {
        if let Some(ref m) = self.metrics {
            m.update_endpoint_count(self.registry.len().await);
        }
    }
}

/// Build the main router: REST API, live feed, health probes and the
/// optional static dashboard.
///
/// `metrics_enabled` only controls whether `/metrics` here answers 503; the
/// exposition itself is served by the metrics listener.
pub fn router(state: AppState, static_dir: Option<&FsPath>, metrics_enabled: bool) -> Router {
    let mut app = Router::new()
        .route("/api/endpoints", get(list_endpoints).post(create_endpoint))
        .route(
            "/api/endpoints/:id",
            get(get_endpoint).delete(delete_endpoint),
        )
        .route("/api/endpoints/:id/check", post(check_endpoint))
        .route("/ws", get(live_ws_handler));

    if !metrics_enabled {
        app = app.route("/metrics", get(metrics_unavailable));
    }

    if let Some(dir) = static_dir {
        app = app
            .nest_service("/static", ServeDir::new(dir))
            .route_service("/", ServeFile::new(dir.join("index.html")));
    }

    app.merge(health::router(state.health()))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-xss-protection"),
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// Handlers

async fn list_endpoints(State(state): State<AppState>) -> Json<Vec<Endpoint>> {
    Json(state.registry.list().await)
}

async fn create_endpoint(
    State(state): State<AppState>,
    payload: Result<Json<RegisterEndpoint>, JsonRejection>,
) -> Result<(StatusCode, Json<Endpoint>), ApiError> {
    let Json(registration) = payload?;
    if let Err(e) = registration.validate() {
        warn!(name = %registration.name, url = %registration.url, error = %e, "Rejected endpoint registration");
        return Err(e.into());
    }

    let id = state.registry.add(registration).await;
    state.update_endpoint_count().await;

    let endpoint = state
        .registry
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(id.clone()))?;
    Ok((StatusCode::CREATED, Json(endpoint)))
}

async fn get_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Endpoint>, ApiError> {
    state
        .registry
        .get(&id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}

async fn delete_endpoint(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.registry.remove(&id).await;
    state.update_endpoint_count().await;
    StatusCode::NO_CONTENT
}

async fn check_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.scheduler.check_now(&id).await {
        Some(_) => {
            info!(id = %id, "Out-of-band check dispatched");
            Ok(StatusCode::ACCEPTED)
        }
        None => Err(ApiError::NotFound(id)),
    }
}

async fn metrics_unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::CONTENT_TYPE, CONTENT_TYPE)],
        UNAVAILABLE_BODY,
    )
        .into_response()
}
