//! Completion tracking for a single submitted prompt.
//!
//! [`next_state`] is the whole transition table: a tracker starts
//! [`TrackerState::Pending`] and the first matching terminal message
//! decides the outcome. Terminal states absorb everything after them, so
//! an `execution_error` seen before the final `executing` frame wins.
//!
//! [`drive`] feeds WebSocket frames through the table until a terminal
//! state or the end of the stream; [`wait_for_completion`] adds the
//! overall timeout and closes the socket itself when it fires. ComfyUI is
//! not told to cancel on timeout, so the prompt may keep running
//! server-side.

use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::client::WsStream;
use crate::events::GenerationEvent;
use crate::messages::{parse_message, ComfyUIMessage};

/// How a tracked job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Completed,
    /// ComfyUI reported an execution error; carries its description.
    Failed(String),
    /// The event stream ended before either of the above.
    ChannelClosedPrematurely,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerState {
    Pending,
    Terminal(TerminalEvent),
}

impl TrackerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackerState::Terminal(_))
    }
}

/// Pure transition function for one parsed message.
///
/// - `executing` with no node for `prompt_id` -> `Completed`
/// - `execution_error` for `prompt_id` -> `Failed`
/// - anything else, or any message once terminal -> unchanged
pub fn next_state(state: TrackerState, prompt_id: &str, msg: &ComfyUIMessage) -> TrackerState {
    if state.is_terminal() || msg.prompt_id() != Some(prompt_id) {
        return state;
    }
    match msg {
        ComfyUIMessage::Executing(data) if data.node.is_none() => {
            TrackerState::Terminal(TerminalEvent::Completed)
        }
        ComfyUIMessage::ExecutionError(data) => {
            TrackerState::Terminal(TerminalEvent::Failed(data.describe()))
        }
        _ => state,
    }
}

/// Errors returned by [`wait_for_completion`].
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Generation timeout after {0:?}")]
    Timeout(Duration),

    #[error("Execution error: {0}")]
    ExecutionFailed(String),

    #[error("WebSocket closed before completion")]
    ChannelClosedPrematurely,
}

/// Tracks one prompt's progress through its event stream.
pub struct CompletionTracker {
    prompt_id: String,
    state: TrackerState,
    events: Option<broadcast::Sender<GenerationEvent>>,
}

impl CompletionTracker {
    pub fn new(prompt_id: impl Into<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            state: TrackerState::Pending,
            events: None,
        }
    }

    /// Publish [`GenerationEvent`]s for this job to `tx`.
    pub fn with_events(mut self, tx: broadcast::Sender<GenerationEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn prompt_id(&self) -> &str {
        &self.prompt_id
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    /// The terminal outcome, if reached.
    pub fn outcome(&self) -> Option<&TerminalEvent> {
        match &self.state {
            TrackerState::Terminal(event) => Some(event),
            TrackerState::Pending => None,
        }
    }

    /// Apply one parsed message. Returns the outcome once terminal.
    pub fn observe(&mut self, msg: &ComfyUIMessage) -> Option<&TerminalEvent> {
        if !self.state.is_terminal() && msg.prompt_id() == Some(self.prompt_id.as_str()) {
            self.instrument(msg);
        }
        let state = std::mem::replace(&mut self.state, TrackerState::Pending);
        self.state = next_state(state, &self.prompt_id, msg);
        self.outcome()
    }

    /// Apply one raw text frame. Frames that are not recognised ComfyUI
    /// messages are skipped.
    pub fn observe_text(&mut self, text: &str) -> Option<&TerminalEvent> {
        match parse_message(text) {
            Ok(msg) => self.observe(&msg),
            Err(e) => {
                tracing::trace!(
                    prompt_id = %self.prompt_id,
                    error = %e,
                    "Skipping unrecognised ComfyUI message",
                );
                self.outcome()
            }
        }
    }

    /// The stream ended. Resolves a still-pending job as
    /// [`TerminalEvent::ChannelClosedPrematurely`].
    pub fn channel_closed(&mut self) -> TerminalEvent {
        if let TrackerState::Terminal(event) = &self.state {
            return event.clone();
        }
        self.state = TrackerState::Terminal(TerminalEvent::ChannelClosedPrematurely);
        TerminalEvent::ChannelClosedPrematurely
    }

    fn instrument(&self, msg: &ComfyUIMessage) {
        let prompt_id = self.prompt_id.clone();
        let event = match msg {
            ComfyUIMessage::Progress(data) => {
                tracing::debug!(
                    prompt_id = %prompt_id,
                    value = data.value,
                    max = data.max,
                    "Generation progress",
                );
                GenerationEvent::Progress {
                    prompt_id,
                    value: data.value,
                    max: data.max,
                    percent: data.percent(),
                }
            }
            ComfyUIMessage::Executing(data) => match &data.node {
                Some(node) => {
                    tracing::debug!(prompt_id = %prompt_id, node = %node, "Executing node");
                    GenerationEvent::NodeExecuting {
                        prompt_id,
                        node: node.clone(),
                    }
                }
                None => {
                    tracing::info!(prompt_id = %prompt_id, "Execution completed (all nodes done)");
                    GenerationEvent::Completed { prompt_id }
                }
            },
            ComfyUIMessage::ExecutionError(data) => {
                let error = data.describe();
                tracing::error!(prompt_id = %prompt_id, error = %error, "Execution error");
                GenerationEvent::Failed { prompt_id, error }
            }
            ComfyUIMessage::ExecutionStart(_) => {
                tracing::info!(prompt_id = %prompt_id, "Execution started");
                return;
            }
            ComfyUIMessage::ExecutionCached(data) => {
                tracing::debug!(prompt_id = %prompt_id, cached = data.nodes.len(), "Execution used cache");
                return;
            }
            ComfyUIMessage::Executed(data) => {
                tracing::debug!(prompt_id = %prompt_id, node = %data.node, "Node executed with output");
                return;
            }
            ComfyUIMessage::Status(_) => return,
        };
        if let Some(tx) = &self.events {
            // No subscribers is fine.
            let _ = tx.send(event);
        }
    }
}

/// Feed frames from `stream` into `tracker` until it reaches a terminal
/// state or the stream ends.
///
/// A receive error is treated like a close: ComfyUI is gone and no
/// further frames will arrive for this job.
pub async fn drive<S>(tracker: &mut CompletionTracker, stream: &mut S) -> TerminalEvent
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Some(outcome) = tracker.observe_text(&text) {
                    return outcome.clone();
                }
            }
            Ok(Message::Binary(_)) => {
                // Latent preview images.
                tracing::trace!(prompt_id = %tracker.prompt_id(), "Ignoring binary message");
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Ok(Message::Close(frame)) => {
                tracing::info!(prompt_id = %tracker.prompt_id(), ?frame, "ComfyUI WebSocket closed");
                break;
            }
            Err(e) => {
                tracing::warn!(prompt_id = %tracker.prompt_id(), error = %e, "WebSocket receive error");
                break;
            }
        }
    }
    tracker.channel_closed()
}

/// Wait for `tracker`'s job to finish on `ws_stream`, for at most
/// `timeout`.
///
/// The socket is closed from this side in every case.
pub async fn wait_for_completion(
    ws_stream: &mut WsStream,
    tracker: &mut CompletionTracker,
    timeout: Duration,
) -> Result<(), TrackerError> {
    let result = tokio::time::timeout(timeout, drive(tracker, ws_stream)).await;

    if let Err(e) = ws_stream.close(None).await {
        tracing::debug!(prompt_id = %tracker.prompt_id(), error = %e, "WebSocket close failed");
    }

    match result {
        Ok(TerminalEvent::Completed) => Ok(()),
        Ok(TerminalEvent::Failed(detail)) => Err(TrackerError::ExecutionFailed(detail)),
        Ok(TerminalEvent::ChannelClosedPrematurely) => Err(TrackerError::ChannelClosedPrematurely),
        Err(_) => {
            tracing::warn!(
                prompt_id = %tracker.prompt_id(),
                timeout_secs = timeout.as_secs_f64(),
                "Timed out waiting for completion; closing event stream",
            );
            Err(TrackerError::Timeout(timeout))
        }
    }
}
