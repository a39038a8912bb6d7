//! Artifact collection for a finished job.
//!
//! Looks up the job's history entry and downloads every listed image,
//! in output-node order and then image order within each node.

use crate::api::{ArtifactRef, ComfyUIApi, ComfyUIApiError, History};
use crate::job::JobHandle;

/// One downloaded output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub reference: ArtifactRef,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// The history request itself failed.
    #[error("Failed to fetch history: {0}")]
    History(#[source] ComfyUIApiError),

    /// History has no entry, or no `outputs`, for the prompt.
    #[error("No history found for prompt {prompt_id}")]
    MissingHistory { prompt_id: String },

    #[error("Failed to fetch image {filename}: {source}")]
    ArtifactFetch {
        filename: String,
        #[source]
        source: ComfyUIApiError,
    },
}

/// References listed for `prompt_id` in `history`, flattened in order.
///
/// An entry whose nodes produced no images yields an empty list; that is
/// a successful job with nothing to collect.
pub fn artifact_refs<'a>(history: &'a History, prompt_id: &str) -> Result<Vec<&'a ArtifactRef>, CollectError> {
    let outputs = history
        .get(prompt_id)
        .and_then(|entry| entry.outputs.as_ref())
        .ok_or_else(|| CollectError::MissingHistory {
            prompt_id: prompt_id.to_string(),
        })?;

    Ok(outputs.values().flat_map(|node| node.images()).collect())
}

/// Fetch every artifact the job produced.
///
/// Downloads run one at a time and the first failure aborts the whole
/// collection; no partial list is returned.
pub async fn collect(api: &ComfyUIApi, job: &JobHandle) -> Result<Vec<Artifact>, CollectError> {
    let history = api
        .get_history(&job.prompt_id)
        .await
        .map_err(CollectError::History)?;
    let refs = artifact_refs(&history, &job.prompt_id)?;

    tracing::debug!(prompt_id = %job.prompt_id, count = refs.len(), "Collecting outputs");

    let mut artifacts = Vec::with_capacity(refs.len());
    for reference in refs {
        let bytes = api
            .view(reference)
            .await
            .map_err(|source| CollectError::ArtifactFetch {
                filename: reference.filename.clone(),
                source,
            })?;
        tracing::debug!(
            prompt_id = %job.prompt_id,
            filename = %reference.filename,
            size = bytes.len(),
            "Fetched output",
        );
        artifacts.push(Artifact {
            reference: reference.clone(),
            bytes,
        });
    }

    Ok(artifacts)
}
