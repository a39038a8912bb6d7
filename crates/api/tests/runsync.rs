//! Integration tests for `POST /runsync`.

mod common;

#[path = "../../comfyui/tests/common/mod.rs"]
mod engine;

use axum::http::StatusCode;
use common::{body_json, post_json, post_raw};
use engine::{execution_error, MockBehavior, MockEngine};
use serde_json::json;

// ---------------------------------------------------------------------------
// Test: a completed job returns COMPLETED with the output
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runsync_returns_completed_output() {
    let engine = MockEngine::start(MockBehavior::completing()).await;
    let app = common::build_test_app(engine.api_url(), engine.ws_url());

    let response = post_json(app, "/runsync", &json!({ "input": { "prompt": "a cat", "seed": 9 } })).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "COMPLETED");
    assert_eq!(json["output"]["count"], 1);
    assert_eq!(json["output"]["seed"], 9);
    assert!(json["output"]["images"][0]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
}

// ---------------------------------------------------------------------------
// Test: invalid prompt is a 400 before ComfyUI is contacted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runsync_rejects_invalid_prompt() {
    let engine = MockEngine::start(MockBehavior::completing()).await;
    let app = common::build_test_app(engine.api_url(), engine.ws_url());

    let response = post_json(app, "/runsync", &json!({ "input": { "prompt": "" } })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "Missing or invalid 'prompt' in input");
    assert_eq!(engine.health_probes(), 0);
}

// ---------------------------------------------------------------------------
// Test: missing input and malformed JSON are 400 with JSON bodies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runsync_rejects_malformed_jobs() {
    let response = post_json(common::build_offline_app(), "/runsync", &json!({ "prompt": "a cat" })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");

    let response = post_raw(common::build_offline_app(), "/runsync", "{not json".into()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
}

// ---------------------------------------------------------------------------
// Test: unreachable engine is 503
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runsync_engine_unavailable() {
    let response = post_json(
        common::build_offline_app(),
        "/runsync",
        &json!({ "input": { "prompt": "a cat" } }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = body_json(response).await;
    assert_eq!(json["code"], "ENGINE_UNAVAILABLE");
}

// ---------------------------------------------------------------------------
// Test: execution failure is 502
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runsync_execution_failure() {
    let engine = MockEngine::start(
        MockBehavior::completing().with_events(vec![execution_error("bad node")]),
    )
    .await;
    let app = common::build_test_app(engine.api_url(), engine.ws_url());

    let response = post_json(app, "/runsync", &json!({ "input": { "prompt": "a cat" } })).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let json = body_json(response).await;
    assert_eq!(json["code"], "EXECUTION_FAILED");
    assert!(json["error"].as_str().unwrap().contains("bad node"));
}
