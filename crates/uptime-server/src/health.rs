//! Liveness and readiness probes, mounted on both listeners.

use crate::registry::EndpointRegistry;
use axum::{Json, Router, extract::State, routing::get};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;

/// Liveness route
pub const HEALTHZ_PATH: &str = "/healthz";

/// Readiness route
pub const READYZ_PATH: &str = "/readyz";

#[derive(Clone)]
pub struct HealthState {
    pub registry: Arc<EndpointRegistry>,
    pub service_name: Arc<str>,
}

/// `/healthz` and `/readyz` routes, usable inside any router
pub fn router<S>(state: HealthState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route(HEALTHZ_PATH, get(healthz))
        .route(READYZ_PATH, get(readyz))
        .with_state(state)
}

/// Always healthy once the process serves requests
async fn healthz(State(state): State<HealthState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().timestamp(),
        "service": &*state.service_name,
    }))
}

async fn readyz(State(state): State<HealthState>) -> Json<Value> {
    Json(json!({
        "status": "ready",
        "timestamp": Utc::now().timestamp(),
        "service": &*state.service_name,
        "endpoints_configured": state.registry.len().await,
    }))
}
