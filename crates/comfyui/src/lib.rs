//! ComfyUI WebSocket and REST client library.
//!
//! Provides the HTTP API wrapper, per-job WebSocket connections, typed
//! message parsing, readiness probing, the completion-tracking state
//! machine, and artifact collection for running one workflow end to end
//! against a ComfyUI server.

pub mod api;
pub mod client;
pub mod collector;
pub mod events;
pub mod job;
pub mod messages;
pub mod readiness;
pub mod tracker;
