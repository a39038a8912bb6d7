//! WebSocket client for connecting to a ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the WebSocket base URL of one ComfyUI server.
//! Call [`ComfyUIClient::connect`] with a job's [`ClientId`] to open the
//! event stream ComfyUI uses to report that job's progress.

use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::job::ClientId;

/// Raw WebSocket stream to ComfyUI.
pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for a ComfyUI event endpoint.
pub struct ComfyUIClient {
    ws_url: String,
}

/// A live WebSocket connection scoped to one correlation id.
pub struct ComfyUIConnection {
    /// The `clientId` sent during the handshake.
    pub client_id: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: WsStream,
}

impl ComfyUIClient {
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:8188`.
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }

    /// WebSocket base URL (e.g. `ws://host:8188`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Connect to `{ws_url}/ws?clientId={client_id}`.
    ///
    /// ComfyUI only addresses a prompt's execution messages to the client
    /// id it was submitted under, so connect before submitting.
    pub async fn connect(&self, client_id: &ClientId) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            client_id = %client_id,
            "Connected to ComfyUI at {}",
            self.ws_url,
        );

        Ok(ComfyUIConnection {
            client_id: client_id.to_string(),
            ws_stream,
        })
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
