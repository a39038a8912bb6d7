//! Identifiers tying a submitted workflow to its event stream.

use std::fmt;

/// Correlation id sent both on the WebSocket handshake (`clientId`) and
/// with the `/prompt` submission (`client_id`).
///
/// Deliberately not `Clone`: submission consumes it into the
/// [`JobHandle`], so one id can never scope two jobs.
#[derive(Debug, PartialEq, Eq)]
pub struct ClientId(String);

impl ClientId {
    /// A fresh random (UUID v4) id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A workflow accepted by ComfyUI.
#[derive(Debug)]
pub struct JobHandle {
    /// Server-assigned prompt id.
    pub prompt_id: String,
    /// Correlation id the workflow was submitted under.
    pub client_id: ClientId,
}
