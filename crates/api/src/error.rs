use aiego_pipeline::error::PipelineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`PipelineError`] for job failures and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON error
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A job failure from `aiego_pipeline`.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Pipeline(err) => (pipeline_status(err), err.code(), err.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        if status.is_server_error() {
            tracing::error!(code, error = %message, "Job request failed");
        }

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// HTTP status for a job failure.
///
/// - Invalid input maps to 400.
/// - An engine that never became ready maps to 503.
/// - Timeouts map to 504.
/// - Local setup problems map to 500.
/// - Everything the engine did wrong maps to 502.
fn pipeline_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
        PipelineError::EngineUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        PipelineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::SubmissionRejected(_)
        | PipelineError::EventChannel(_)
        | PipelineError::ExecutionFailed(_)
        | PipelineError::ChannelClosedPrematurely
        | PipelineError::HistoryUnavailable(_)
        | PipelineError::MissingHistory { .. }
        | PipelineError::ArtifactFetchFailed { .. } => StatusCode::BAD_GATEWAY,
    }
}
