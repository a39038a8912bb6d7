//! Progress events emitted while a job is being tracked.
//!
//! These are instrumentation only: subscribers (loggers, progress
//! reporters) receive them, but they never influence how a job resolves.

use serde::Serialize;

/// A job-level event derived from raw ComfyUI WebSocket messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// A node started executing.
    NodeExecuting { prompt_id: String, node: String },

    /// A sampling node made progress (step `value` of `max`).
    Progress {
        prompt_id: String,
        value: i64,
        max: i64,
        /// Completion percentage (0-100).
        percent: u8,
    },

    /// Every node finished.
    Completed { prompt_id: String },

    /// ComfyUI reported an execution error.
    Failed { prompt_id: String, error: String },
}
