//! Fixed-interval readiness probing for a ComfyUI instance.
//!
//! ComfyUI is started alongside the worker and takes a bounded amount of
//! time to load. [`await_ready`] polls `/system_stats` until it answers
//! with a 2xx or the attempt budget runs out. Failed probes of any kind
//! (refused connection, timeout, non-2xx) are retried the same way.

use std::time::Duration;

use crate::api::ComfyUIApi;

/// Tunable parameters for readiness probing.
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Total number of probes before giving up.
    pub max_attempts: u32,
    /// Delay between consecutive probes.
    pub interval: Duration,
    /// Per-probe HTTP timeout.
    pub probe_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    /// Every probe in the budget failed.
    #[error("ComfyUI did not respond after {attempts} attempts")]
    EngineUnavailable { attempts: u32 },
}

/// Poll until ComfyUI is healthy.
///
/// Returns the 1-based attempt that succeeded.
pub async fn await_ready(api: &ComfyUIApi, config: &ReadinessConfig) -> Result<u32, ReadinessError> {
    for attempt in 1..=config.max_attempts {
        match api.check_health(config.probe_timeout).await {
            Ok(()) => {
                tracing::info!(attempt, api_url = %api.api_url(), "ComfyUI ready");
                return Ok(attempt);
            }
            Err(e) => {
                tracing::debug!(
                    attempt,
                    max_attempts = config.max_attempts,
                    error = %e,
                    "ComfyUI not ready yet",
                );
            }
        }

        if attempt < config.max_attempts {
            tokio::time::sleep(config.interval).await;
        }
    }

    tracing::warn!(
        attempts = config.max_attempts,
        api_url = %api.api_url(),
        "ComfyUI readiness budget exhausted",
    );
    Err(ReadinessError::EngineUnavailable {
        attempts: config.max_attempts,
    })
}
