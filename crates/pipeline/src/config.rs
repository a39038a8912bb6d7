use std::time::Duration;

use aiego_comfyui::readiness::ReadinessConfig;

/// ComfyUI connection settings, loaded from environment variables.
///
/// All fields have defaults suitable for a worker running next to a local
/// ComfyUI on its default port.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// HTTP base URL (default: `http://127.0.0.1:8188`).
    pub api_url: String,
    /// WebSocket base URL (default: `ws://127.0.0.1:8188`).
    pub ws_url: String,
    /// Readiness probes before giving up (default: `60`).
    pub ready_max_attempts: u32,
    /// Delay between readiness probes (default: 1 s).
    pub ready_interval: Duration,
    /// Upper bound on waiting for a job to finish (default: 300 s).
    pub completion_timeout: Duration,
    /// Default timeout for REST calls (default: 30 s).
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8188".into(),
            ws_url: "ws://127.0.0.1:8188".into(),
            ready_max_attempts: 60,
            ready_interval: Duration::from_millis(1000),
            completion_timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default                  |
    /// |-----------------------------------|--------------------------|
    /// | `COMFYUI_API_URL`                 | `http://127.0.0.1:8188`  |
    /// | `COMFYUI_WS_URL`                  | `ws://127.0.0.1:8188`    |
    /// | `COMFYUI_READY_MAX_ATTEMPTS`      | `60`                     |
    /// | `COMFYUI_READY_INTERVAL_MS`       | `1000`                   |
    /// | `COMFYUI_COMPLETION_TIMEOUT_SECS` | `300`                    |
    /// | `COMFYUI_REQUEST_TIMEOUT_SECS`    | `30`                     |
    ///
    /// # Panics
    ///
    /// On a numeric variable that does not parse. Called once at start-up.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_url = std::env::var("COMFYUI_API_URL").unwrap_or(defaults.api_url);
        let ws_url = std::env::var("COMFYUI_WS_URL").unwrap_or(defaults.ws_url);

        let ready_max_attempts: u32 = std::env::var("COMFYUI_READY_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("COMFYUI_READY_MAX_ATTEMPTS must be a valid u32");

        let ready_interval_ms: u64 = std::env::var("COMFYUI_READY_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("COMFYUI_READY_INTERVAL_MS must be a valid u64");

        let completion_timeout_secs: u64 = std::env::var("COMFYUI_COMPLETION_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("COMFYUI_COMPLETION_TIMEOUT_SECS must be a valid u64");

        let request_timeout_secs: u64 = std::env::var("COMFYUI_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("COMFYUI_REQUEST_TIMEOUT_SECS must be a valid u64");

        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            ws_url: ws_url.trim_end_matches('/').to_string(),
            ready_max_attempts,
            ready_interval: Duration::from_millis(ready_interval_ms),
            completion_timeout: Duration::from_secs(completion_timeout_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
        }
    }

    /// Readiness probing parameters for this engine.
    pub fn readiness(&self) -> ReadinessConfig {
        ReadinessConfig {
            max_attempts: self.ready_max_attempts,
            interval: self.ready_interval,
            ..ReadinessConfig::default()
        }
    }
}
