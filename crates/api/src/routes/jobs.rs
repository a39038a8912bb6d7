//! Synchronous job endpoint, shaped like a serverless runner's `/runsync`.

use aiego_pipeline::response::GenerationResponse;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{routing::post, Json, Router};
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RunResponse {
    /// Always `COMPLETED`; failures are error responses.
    pub status: &'static str,
    pub output: GenerationResponse,
}

/// POST /runsync -- run one job `{"input": {...}}` and wait for its images.
async fn run_sync(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<RunResponse>> {
    let Json(job) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let input = job
        .get("input")
        .ok_or_else(|| AppError::BadRequest("Missing 'input' in job".into()))?;

    let output = state.orchestrator.run(input).await?;
    tracing::info!(count = output.count, seed = output.seed, "Job completed");

    Ok(Json(RunResponse {
        status: "COMPLETED",
        output,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/runsync", post(run_sync))
}
