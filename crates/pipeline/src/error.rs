use std::time::Duration;

use aiego_comfyui::client::ComfyUIClientError;
use aiego_comfyui::collector::CollectError;
use aiego_comfyui::readiness::ReadinessError;
use aiego_comfyui::tracker::TrackerError;
use aiego_core::error::CoreError;

/// Every way a generation job can fail.
///
/// Only readiness is retried (inside [`aiego_comfyui::readiness`]); any
/// other failure ends the job with no partial result.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Caller input was rejected before any engine contact.
    #[error("{0}")]
    Validation(String),

    #[error("ComfyUI not ready after {attempts} attempts")]
    EngineUnavailable { attempts: u32 },

    #[error("Failed to queue prompt: {0}")]
    SubmissionRejected(String),

    /// The event stream could not be opened.
    #[error("Event stream unavailable: {0}")]
    EventChannel(String),

    #[error("Generation timeout after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Execution error: {0}")]
    ExecutionFailed(String),

    #[error("WebSocket closed before completion")]
    ChannelClosedPrematurely,

    #[error("Failed to fetch history: {0}")]
    HistoryUnavailable(String),

    #[error("No history found for prompt {prompt_id}")]
    MissingHistory { prompt_id: String },

    #[error("Failed to fetch image {filename}: {detail}")]
    ArtifactFetchFailed { filename: String, detail: String },

    /// The worker could not be set up (HTTP client construction).
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "VALIDATION_ERROR",
            PipelineError::EngineUnavailable { .. } => "ENGINE_UNAVAILABLE",
            PipelineError::SubmissionRejected(_) => "SUBMISSION_REJECTED",
            PipelineError::EventChannel(_) => "EVENT_CHANNEL_ERROR",
            PipelineError::Timeout(_) => "TIMEOUT",
            PipelineError::ExecutionFailed(_) => "EXECUTION_FAILED",
            PipelineError::ChannelClosedPrematurely => "CHANNEL_CLOSED",
            PipelineError::HistoryUnavailable(_) => "HISTORY_UNAVAILABLE",
            PipelineError::MissingHistory { .. } => "MISSING_HISTORY",
            PipelineError::ArtifactFetchFailed { .. } => "ARTIFACT_FETCH_FAILED",
            PipelineError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => PipelineError::Validation(msg),
        }
    }
}

impl From<ReadinessError> for PipelineError {
    fn from(err: ReadinessError) -> Self {
        match err {
            ReadinessError::EngineUnavailable { attempts } => {
                PipelineError::EngineUnavailable { attempts }
            }
        }
    }
}

impl From<ComfyUIClientError> for PipelineError {
    fn from(err: ComfyUIClientError) -> Self {
        PipelineError::EventChannel(err.to_string())
    }
}

impl From<TrackerError> for PipelineError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::Timeout(after) => PipelineError::Timeout(after),
            TrackerError::ExecutionFailed(detail) => PipelineError::ExecutionFailed(detail),
            TrackerError::ChannelClosedPrematurely => PipelineError::ChannelClosedPrematurely,
        }
    }
}

impl From<CollectError> for PipelineError {
    fn from(err: CollectError) -> Self {
        match err {
            CollectError::History(source) => PipelineError::HistoryUnavailable(source.to_string()),
            CollectError::MissingHistory { prompt_id } => PipelineError::MissingHistory { prompt_id },
            CollectError::ArtifactFetch { filename, source } => PipelineError::ArtifactFetchFailed {
                filename,
                detail: source.to_string(),
            },
        }
    }
}
