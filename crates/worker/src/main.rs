//! Runs one generation job and prints the handler output as JSON.
//!
//! The job document is read from the file named by the first argument,
//! or from stdin when there is none. Logs go to stderr; stdout carries
//! only the result.

use std::process::ExitCode;

use aiego_pipeline::config::EngineConfig;
use aiego_pipeline::orchestrator::Orchestrator;
use aiego_worker::{handle_job, is_error, log_events};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aiego_worker=info,aiego_pipeline=info,aiego_comfyui=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let job = match read_job().await {
        Ok(job) => job,
        Err(e) => {
            tracing::error!(error = %e, "Could not read job");
            println!("{}", serde_json::json!({ "error": e }));
            return ExitCode::FAILURE;
        }
    };

    let config = EngineConfig::from_env();
    tracing::info!(api_url = %config.api_url, "Worker starting");

    let orchestrator = match Orchestrator::new(config) {
        Ok(o) => o,
        Err(e) => {
            tracing::error!(error = %e, "Could not set up orchestrator");
            println!("{}", serde_json::json!({ "error": e.to_string() }));
            return ExitCode::FAILURE;
        }
    };

    let events = orchestrator.subscribe();
    tokio::spawn(log_events(events));

    let output = handle_job(&orchestrator, &job).await;
    println!("{output}");

    if is_error(&output) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn read_job() -> Result<Value, String> {
    let text = match std::env::args().nth(1) {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("Failed to read {path}: {e}"))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .map_err(|e| format!("Failed to read stdin: {e}"))?;
            buf
        }
    };
    serde_json::from_str(&text).map_err(|e| format!("Invalid job JSON: {e}"))
}
