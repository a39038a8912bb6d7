#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use aiego_api::config::ServerConfig;
use aiego_api::router::build_app_router;
use aiego_api::state::AppState;
use aiego_pipeline::config::EngineConfig;
use aiego_pipeline::orchestrator::Orchestrator;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
    }
}

/// Build the full application router pointed at a ComfyUI at
/// `api_url` / `ws_url`, with a short readiness budget.
pub fn build_test_app(api_url: String, ws_url: String) -> Router {
    let orchestrator = Orchestrator::new(EngineConfig {
        api_url,
        ws_url,
        ready_max_attempts: 2,
        ready_interval: Duration::from_millis(5),
        completion_timeout: Duration::from_secs(5),
        ..EngineConfig::default()
    })
    .expect("orchestrator");

    let config = test_config();
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
    };
    build_app_router(state, &config)
}

/// An app whose ComfyUI is unreachable (nothing listens on port 9).
pub fn build_offline_app() -> Router {
    build_test_app("http://127.0.0.1:9".into(), "ws://127.0.0.1:9".into())
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: &Value) -> Response<Body> {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: String) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
