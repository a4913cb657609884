//! REST API router tests

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::Router;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uptime_probe::{ProbeOutcome, ProbeTarget, Prober};
use uptime_server::{AppState, EndpointRegistry, FanOut, MetricsRegistry, Scheduler, api};

struct FixedProber(u16);

#[async_trait]
impl Prober for FixedProber {
    async fn probe(&self, _target: &ProbeTarget) -> ProbeOutcome {
        ProbeOutcome::from_response(self.0, Duration::from_millis(5))
    }
}

struct TestApp {
    router: Router,
    registry: Arc<EndpointRegistry>,
}

fn app(metrics_enabled: bool) -> TestApp {
    let registry = Arc::new(EndpointRegistry::new());
    let metrics = metrics_enabled.then(|| Arc::new(MetricsRegistry::new()));
    let fanout = Arc::new(FanOut::new(16, metrics.clone()));
    let scheduler = Scheduler::new(
        registry.clone(),
        Arc::new(FixedProber(200)),
        fanout.clone(),
        metrics.clone(),
    );

    let state = AppState {
        registry: registry.clone(),
        scheduler,
        fanout,
        metrics,
        service_name: Arc::from("uptime-test"),
    };

    TestApp {
        router: api::router(state, None, metrics_enabled),
        registry,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into()))
    };
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_register_then_list() {
    let app = app(true);

    let (status, created) = send(
        &app.router,
        post_json(
            "/api/endpoints",
            json!({
                "name": "A",
                "url": "https://example.com",
                "interval_seconds": 30,
                "timeout_seconds": 5,
                "status": "up"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "checking");
    assert_eq!(created["method"], "GET");
    assert_eq!(created["interval_seconds"], 30);
    assert_eq!(created["timeout_seconds"], 5);
    assert!(created["last_check"].is_null());
    let id = created["id"].as_str().unwrap().to_string();

    let (status, list) = send(&app.router, get("/api/endpoints")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["id"], id.as_str());

    let (status, one) = send(&app.router, get(&format!("/api/endpoints/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(one["name"], "A");
}

#[tokio::test]
async fn test_register_with_explicit_id_and_labels() {
    let app = app(true);

    let (status, created) = send(
        &app.router,
        post_json(
            "/api/endpoints",
            json!({
                "id": "web",
                "name": "Web",
                "url": "http://web.internal/healthz",
                "method": "head",
                "labels": {"env": "prod"},
                "probe_type": "healthz"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], "web");
    assert_eq!(created["method"], "HEAD");
    assert_eq!(created["labels"]["env"], "prod");
    assert_eq!(created["probe_type"], "healthz");
    assert_eq!(created["interval_seconds"], 30);
}

#[tokio::test]
async fn test_register_rejects_invalid_input() {
    let app = app(true);

    for body in [
        json!({"name": "", "url": "https://example.com"}),
        json!({"name": "A", "url": "example.com"}),
        json!({"name": "A", "url": "https://example.com", "labels": {"bad-key": "x"}}),
        json!({"name": "A", "url": "https://example.com", "method": "GE T"}),
    ] {
        let (status, error) = send(&app.router, post_json("/api/endpoints", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error["error"].is_string());
    }

    assert!(app.registry.is_empty().await);
}

#[tokio::test]
async fn test_register_rejects_malformed_json() {
    let app = app(true);

    let request = Request::builder()
        .method("POST")
        .uri("/api/endpoints")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, error) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].as_str().unwrap().starts_with("invalid request"));
}

#[tokio::test]
async fn test_get_unknown_endpoint() {
    let app = app(true);
    let (status, error) = send(&app.router, get("/api/endpoints/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"], "endpoint not found: nope");
}

#[tokio::test]
async fn test_delete_endpoint() {
    let app = app(true);
    let (_, created) = send(
        &app.router,
        post_json("/api/endpoints", json!({"name": "A", "url": "https://a.example"})),
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let (status, _) = send(&app.router, delete(&format!("/api/endpoints/{}", id))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(app.registry.is_empty().await);

    // Unknown ids are not an error
    let (status, _) = send(&app.router, delete("/api/endpoints/nope")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_trigger_check() {
    let app = app(true);
    let (_, created) = send(
        &app.router,
        post_json("/api/endpoints", json!({"name": "A", "url": "https://a.example"})),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app.router,
        Request::builder()
            .method("POST")
            .uri(format!("/api/endpoints/{}/check", id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // The probe runs in the background
    let mut checked = None;
    for _ in 0..50 {
        let ep = app.registry.get(&id).await.unwrap();
        if ep.last_check.is_some() {
            checked = Some(ep);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let ep = checked.expect("out-of-band check never completed");
    assert_eq!(ep.status_code, 200);

    let (status, _) = send(
        &app.router,
        Request::builder()
            .method("POST")
            .uri("/api/endpoints/nope/check")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_routes() {
    let app = app(true);
    send(
        &app.router,
        post_json("/api/endpoints", json!({"name": "A", "url": "https://a.example"})),
    )
    .await;

    let (status, health) = send(&app.router, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["service"], "uptime-test");
    assert!(health["timestamp"].as_i64().unwrap() > 0);

    let (status, ready) = send(&app.router, get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ready["status"], "ready");
    assert_eq!(ready["endpoints_configured"], 1);
}

#[tokio::test]
async fn test_metrics_unavailable_when_disabled() {
    let app = app(false);
    let response = app.router.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"# Metrics not available\n");
}

#[tokio::test]
async fn test_metrics_not_on_main_router_when_enabled() {
    let app = app(true);
    let (status, _) = send(&app.router, get("/metrics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_security_and_cors_headers() {
    let app = app(true);
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/endpoints")
                .header(header::ORIGIN, "http://dashboard.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-xss-protection"], "1; mode=block");
    assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
    assert_eq!(headers["access-control-allow-origin"], "*");
}
