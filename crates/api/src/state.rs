use std::sync::Arc;

use aiego_pipeline::orchestrator::Orchestrator;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Runs generation jobs against ComfyUI.
    pub orchestrator: Arc<Orchestrator>,
}
