//! End-to-end execution of one generation job.
//!
//! ```text
//! input -> validate -> await ready -> build graph -> open event stream
//!       -> submit -> wait for completion -> collect -> response
//! ```
//!
//! The event stream is opened before submission, under the job's fresh
//! client id, so ComfyUI cannot report completion before anyone listens.

use std::time::{Duration, Instant};

use aiego_comfyui::api::ComfyUIApi;
use aiego_comfyui::client::ComfyUIClient;
use aiego_comfyui::collector::collect;
use aiego_comfyui::events::GenerationEvent;
use aiego_comfyui::job::ClientId;
use aiego_comfyui::readiness::await_ready;
use aiego_comfyui::tracker::{wait_for_completion, CompletionTracker};
use aiego_core::request::GenerationRequest;
use aiego_core::workflow::build_graph;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::EngineConfig;
use crate::error::PipelineError;
use crate::response::{data_uri, round_seconds, GenerationResponse};

/// Capacity of the instrumentation event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Runs generation jobs against one ComfyUI instance.
///
/// Holds no per-job state; concurrent calls each get their own client id,
/// event stream and graph.
pub struct Orchestrator {
    config: EngineConfig,
    api: ComfyUIApi,
    client: ComfyUIClient,
    events: broadcast::Sender<GenerationEvent>,
}

impl Orchestrator {
    pub fn new(config: EngineConfig) -> Result<Self, PipelineError> {
        let api = ComfyUIApi::with_timeout(config.api_url.clone(), config.request_timeout)
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        let client = ComfyUIClient::new(config.ws_url.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            api,
            client,
            events,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to progress events of every job run from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.events.subscribe()
    }

    /// One readiness probe, without retries.
    pub async fn engine_ready(&self, timeout: Duration) -> bool {
        self.api.check_health(timeout).await.is_ok()
    }

    /// Validate a caller's `input` object and run it.
    ///
    /// Invalid input fails before ComfyUI is contacted.
    pub async fn run(&self, input: &Value) -> Result<GenerationResponse, PipelineError> {
        let request = GenerationRequest::from_input(input)?;
        self.generate(request).await
    }

    /// Run an already-validated request.
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, PipelineError> {
        let started = Instant::now();

        let attempts = await_ready(&self.api, &self.config.readiness()).await?;
        tracing::debug!(attempts, "ComfyUI reachable");

        let graph = build_graph(&request);
        tracing::info!(
            seed = request.seed,
            nodes = graph.len(),
            width = request.width,
            height = request.height,
            upscale = request.upscale.enabled,
            face_detailer = request.face_detailer,
            post_processing = !request.post.is_neutral(),
            "Built workflow",
        );

        let client_id = ClientId::generate();
        let mut connection = self.client.connect(&client_id).await?;

        let job = match self.api.submit_workflow(&graph, client_id).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(error = %e, "Workflow submission failed");
                if let Err(close_err) = connection.ws_stream.close(None).await {
                    tracing::debug!(error = %close_err, "WebSocket close failed");
                }
                return Err(PipelineError::SubmissionRejected(e.to_string()));
            }
        };
        tracing::info!(prompt_id = %job.prompt_id, "Queued prompt");

        let mut tracker = CompletionTracker::new(&job.prompt_id).with_events(self.events.clone());
        wait_for_completion(
            &mut connection.ws_stream,
            &mut tracker,
            self.config.completion_timeout,
        )
        .await?;

        let artifacts = collect(&self.api, &job).await?;
        let images: Vec<String> = artifacts.iter().map(data_uri).collect();

        let elapsed_seconds = round_seconds(started.elapsed().as_secs_f64());
        tracing::info!(
            prompt_id = %job.prompt_id,
            count = images.len(),
            elapsed_seconds,
            "Generation finished",
        );

        Ok(GenerationResponse {
            count: images.len(),
            images,
            prompt: request.prompt,
            seed: request.seed,
            elapsed_seconds,
        })
    }
}
