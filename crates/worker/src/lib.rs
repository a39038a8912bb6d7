//! Serverless job boundary.
//!
//! A job document is `{"id": ..., "input": {...}}`. [`handle_job`] runs its
//! `input` through the orchestrator and always returns a JSON value: the
//! generation response on success, `{"error": "..."}` on failure, which is
//! the shape job runners expect back from a handler.

use aiego_comfyui::events::GenerationEvent;
use aiego_pipeline::error::PipelineError;
use aiego_pipeline::orchestrator::Orchestrator;
use serde_json::{json, Value};
use tokio::sync::broadcast::{self, error::RecvError};

/// Run one job document and produce the handler output.
pub async fn handle_job(orchestrator: &Orchestrator, job: &Value) -> Value {
    let job_id = job.get("id").and_then(Value::as_str).unwrap_or("local");

    let Some(input) = job.get("input") else {
        tracing::warn!(job_id, "Job has no input");
        return error_output(&PipelineError::Validation("Missing 'input' in job".into()));
    };

    match orchestrator.run(input).await {
        Ok(response) => {
            tracing::info!(job_id, count = response.count, seed = response.seed, "Job completed");
            match serde_json::to_value(&response) {
                Ok(value) => value,
                Err(e) => json!({ "error": format!("Failed to encode response: {e}") }),
            }
        }
        Err(e) => {
            tracing::error!(job_id, code = e.code(), error = %e, "Job failed");
            error_output(&e)
        }
    }
}

/// Whether a handler output reports a failure.
pub fn is_error(output: &Value) -> bool {
    output.get("error").is_some()
}

fn error_output(err: &PipelineError) -> Value {
    json!({ "error": err.to_string() })
}

/// Log generation events until the orchestrator is dropped.
pub async fn log_events(mut events: broadcast::Receiver<GenerationEvent>) {
    loop {
        match events.recv().await {
            Ok(GenerationEvent::Progress {
                prompt_id,
                value,
                max,
                percent,
            }) => {
                tracing::info!(%prompt_id, value, max, percent, "Progress");
            }
            Ok(GenerationEvent::NodeExecuting { prompt_id, node }) => {
                tracing::debug!(%prompt_id, %node, "Node executing");
            }
            Ok(GenerationEvent::Completed { .. } | GenerationEvent::Failed { .. }) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Progress logger fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
