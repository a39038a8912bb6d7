//! Caller-facing result of a generation job.

use aiego_comfyui::collector::Artifact;
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// `data:` URIs in the order ComfyUI reported the images.
    pub images: Vec<String>,
    pub count: usize,
    pub prompt: String,
    pub seed: u64,
    /// Wall-clock duration of the whole job, rounded to 2 decimals.
    pub elapsed_seconds: f64,
}

/// MIME type for an output file, from its extension. PNG when unknown.
pub fn mime_type(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/png",
    }
}

/// Encode an artifact as a base64 `data:` URI.
pub fn data_uri(artifact: &Artifact) -> String {
    format!(
        "data:{};base64,{}",
        mime_type(&artifact.reference.filename),
        base64::engine::general_purpose::STANDARD.encode(&artifact.bytes)
    )
}

pub(crate) fn round_seconds(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
