//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the ComfyUI HTTP API (health probe, workflow submission, history
//! retrieval, output file download) using [`reqwest`].

use std::time::Duration;

use aiego_core::graph::ComputationGraph;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::job::{ClientId, JobHandle};

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Body of a `POST /prompt` request.
#[derive(Serialize)]
struct PromptRequest<'a> {
    prompt: &'a ComputationGraph,
    client_id: &'a str,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: Option<i64>,
}

// ---------------------------------------------------------------------------
// History payloads
// ---------------------------------------------------------------------------

/// `GET /history/{prompt_id}` response: prompt id -> entry.
///
/// Maps preserve the server's key order so outputs are reported in the
/// order ComfyUI lists them.
pub type History = IndexMap<String, HistoryEntry>;

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    /// Per-node outputs; absent until the prompt has produced results.
    #[serde(default)]
    pub outputs: Option<IndexMap<String, NodeOutput>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeOutput {
    /// `null` and a missing key both mean the node saved no images.
    #[serde(default)]
    images: Option<Vec<ArtifactRef>>,
}

impl NodeOutput {
    pub fn images(&self) -> &[ArtifactRef] {
        self.images.as_deref().unwrap_or_default()
    }
}

/// Location of one output file on the ComfyUI server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtifactRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub storage: StorageType,
}

/// ComfyUI storage directory an artifact lives in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum StorageType {
    #[default]
    Output,
    Temp,
    Input,
    Other(String),
}

impl From<String> for StorageType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "output" => StorageType::Output,
            "temp" => StorageType::Temp,
            "input" => StorageType::Input,
            _ => StorageType::Other(value),
        }
    }
}

impl StorageType {
    pub fn as_str(&self) -> &str {
        match self {
            StorageType::Output => "output",
            StorageType::Temp => "temp",
            StorageType::Input => "input",
            StorageType::Other(other) => other,
        }
    }
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose body reports a failure or lacks required fields.
    #[error("ComfyUI rejected the request: {0}")]
    Rejected(String),
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create an API client whose requests time out after `timeout`
    /// unless a call sets its own.
    pub fn with_timeout(api_url: String, timeout: Duration) -> Result<Self, ComfyUIApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// HTTP API base URL (e.g. `http://host:8188`).
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Probe `GET /system_stats`. Any 2xx counts as healthy.
    pub async fn check_health(&self, timeout: Duration) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/system_stats", self.api_url))
            .timeout(timeout)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /prompt` with the workflow and the caller's correlation
    /// id, which is consumed into the returned [`JobHandle`]. ComfyUI can
    /// answer 200 with an `error` field for invalid graphs; that is
    /// reported as [`ComfyUIApiError::Rejected`].
    pub async fn submit_workflow(
        &self,
        workflow: &ComputationGraph,
        client_id: ClientId,
    ) -> Result<JobHandle, ComfyUIApiError> {
        let body = PromptRequest {
            prompt: workflow,
            client_id: client_id.as_str(),
        };

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        let value: serde_json::Value = Self::parse_response(response).await?;
        if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
            return Err(ComfyUIApiError::Rejected(error.to_string()));
        }
        let submitted: SubmitResponse = serde_json::from_value(value)
            .map_err(|e| ComfyUIApiError::Rejected(format!("unexpected /prompt response: {e}")))?;

        tracing::debug!(
            prompt_id = %submitted.prompt_id,
            queue_number = ?submitted.number,
            client_id = %client_id,
            "Workflow queued",
        );

        Ok(JobHandle {
            prompt_id: submitted.prompt_id,
            client_id,
        })
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends a `GET /history/{prompt_id}` request. An empty map means
    /// ComfyUI has no record of the prompt.
    pub async fn get_history(&self, prompt_id: &str) -> Result<History, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download the raw bytes of an output file via `GET /view`.
    pub async fn view(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", artifact.filename.as_str()),
                ("subfolder", artifact.subfolder.as_str()),
                ("type", artifact.storage.as_str()),
            ])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ComfyUIApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_keeps_server_output_order() {
        let json = r#"{"p1":{"outputs":{
            "9":{"images":[{"filename":"a.png","subfolder":"","type":"output"}]},
            "10":{"images":[{"filename":"b.png","subfolder":"x","type":"temp"}]}
        }}}"#;
        let history: History = serde_json::from_str(json).unwrap();
        let outputs = history["p1"].outputs.as_ref().unwrap();
        let keys: Vec<_> = outputs.keys().map(String::as_str).collect();
        assert_eq!(keys, ["9", "10"]);
        assert_eq!(outputs["10"].images()[0].storage, StorageType::Temp);
        assert_eq!(outputs["10"].images()[0].subfolder, "x");
    }

    #[test]
    fn artifact_ref_defaults() {
        let r: ArtifactRef = serde_json::from_str(r#"{"filename":"a.png"}"#).unwrap();
        assert_eq!(r.subfolder, "");
        assert_eq!(r.storage, StorageType::Output);
    }

    #[test]
    fn unknown_storage_type_is_preserved() {
        let r: ArtifactRef =
            serde_json::from_str(r#"{"filename":"a.png","type":"archive"}"#).unwrap();
        assert_eq!(r.storage, StorageType::Other("archive".into()));
        assert_eq!(r.storage.as_str(), "archive");
    }

    #[test]
    fn entry_without_outputs_parses() {
        let history: History = serde_json::from_str(r#"{"p1":{"status":{}}}"#).unwrap();
        assert!(history["p1"].outputs.is_none());
    }

    #[test]
    fn prompt_request_body_shape() {
        let graph = ComputationGraph::new();
        let body = serde_json::to_value(PromptRequest {
            prompt: &graph,
            client_id: "abc",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"prompt": {}, "client_id": "abc"}));
    }
}
