//! Artifact collection against a mock ComfyUI.

mod common;

use aiego_comfyui::api::ComfyUIApi;
use aiego_comfyui::collector::{collect, CollectError};
use aiego_comfyui::job::{ClientId, JobHandle};
use assert_matches::assert_matches;
use common::{history_with, MockBehavior, MockEngine, PNG_BYTES, PROMPT_ID};

fn handle(prompt_id: &str) -> JobHandle {
    JobHandle {
        prompt_id: prompt_id.to_string(),
        client_id: ClientId::generate(),
    }
}

// ---------------------------------------------------------------------------
// Test: artifacts come back in history order with their bytes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn collects_in_history_order() {
    let behavior = MockBehavior::completing()
        .with_history(history_with(&[
            ("9", &["first.png", "second.png"]),
            ("10", &["third.png"]),
        ]))
        .with_file("first.png", b"one")
        .with_file("second.png", b"two")
        .with_file("third.png", PNG_BYTES);
    let engine = MockEngine::start(behavior).await;
    let api = ComfyUIApi::new(engine.api_url());

    let artifacts = collect(&api, &handle(PROMPT_ID)).await.unwrap();

    let names: Vec<_> = artifacts.iter().map(|a| a.reference.filename.as_str()).collect();
    assert_eq!(names, ["first.png", "second.png", "third.png"]);
    assert_eq!(artifacts[1].bytes, b"two");
    assert_eq!(artifacts[2].bytes, PNG_BYTES);
    assert_eq!(engine.views(), ["first.png", "second.png", "third.png"]);
}

// ---------------------------------------------------------------------------
// Test: a job with no images collects nothing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_outputs_collect_nothing() {
    let engine = MockEngine::start(MockBehavior::completing().with_history(history_with(&[]))).await;
    let api = ComfyUIApi::new(engine.api_url());

    let artifacts = collect(&api, &handle(PROMPT_ID)).await.unwrap();

    assert!(artifacts.is_empty());
    assert!(engine.views().is_empty());
}

// ---------------------------------------------------------------------------
// Test: an output node with an empty image list collects nothing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_image_list_collects_nothing() {
    let engine = MockEngine::start(MockBehavior::completing().with_history(history_with(&[("9", &[])]))).await;
    let api = ComfyUIApi::new(engine.api_url());

    let artifacts = collect(&api, &handle(PROMPT_ID)).await.unwrap();

    assert!(artifacts.is_empty());
    assert!(engine.views().is_empty());
}

// ---------------------------------------------------------------------------
// Test: unknown prompt is missing history
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_prompt_is_missing_history() {
    let engine = MockEngine::start(MockBehavior::completing()).await;
    let api = ComfyUIApi::new(engine.api_url());

    let err = collect(&api, &handle("never-submitted")).await.unwrap_err();

    assert_matches!(err, CollectError::MissingHistory { ref prompt_id } if prompt_id == "never-submitted");
}

// ---------------------------------------------------------------------------
// Test: the first failed download aborts collection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_download_aborts() {
    let behavior = MockBehavior::completing()
        .without_files()
        .with_history(history_with(&[("9", &["gone.png", "after.png"])]))
        .with_file("after.png", b"never fetched");
    let engine = MockEngine::start(behavior).await;
    let api = ComfyUIApi::new(engine.api_url());

    let err = collect(&api, &handle(PROMPT_ID)).await.unwrap_err();

    assert_matches!(err, CollectError::ArtifactFetch { ref filename, .. } if filename == "gone.png");
    assert_eq!(engine.views(), ["gone.png"]);
}
