//! Network relay control channel.
//!
//! Some displays sit behind a LAN relay (a Raspberry Pi wired to the
//! monitor's service port, or a smart-monitor agent).  The relay exposes a
//! small JSON-over-HTTP protocol addressed by display serial:
//!
//! ```text
//! POST /displays/<serial>/write   {"command": "brightness", "value": 40}
//! POST /displays/<serial>/read    {"command": "brightness"}  -> {"value": 40}
//! POST /displays/<serial>/reset
//! GET  /displays/<serial>/ping
//! ```
//!
//! The HTTP client sits behind [`RelayTransport`] so tests can script the
//! relay without sockets.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lux_core::{Capability, DisplayRecord};
use serde_json::{json, Value};
use tracing::warn;

use super::{Command, ControlBackend, ControlError};

/// Transport seam for the relay protocol.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// POSTs `body` to `path` (relative to the relay base URL) and returns
    /// the parsed JSON response body.
    async fn post(&self, path: &str, body: Value) -> Result<Value, ControlError>;

    /// GETs `path`; success means the relay answered at all.
    async fn get(&self, path: &str) -> Result<Value, ControlError>;
}

/// reqwest-backed transport.
pub struct HttpRelay {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRelay {
    /// # Errors
    ///
    /// Returns [`ControlError::Relay`] when the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ControlError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ControlError::Relay(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl RelayTransport for HttpRelay {
    async fn post(&self, path: &str, body: Value) -> Result<Value, ControlError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ControlError::Relay(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ControlError::Relay(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ControlError::Relay(e.to_string()))
    }

    async fn get(&self, path: &str) -> Result<Value, ControlError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ControlError::Relay(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ControlError::Relay(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ControlError::Relay(e.to_string()))
    }
}

/// The network relay control backend.
pub struct NetworkControl {
    relay: Arc<dyn RelayTransport>,
}

impl NetworkControl {
    pub fn new(relay: Arc<dyn RelayTransport>) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl ControlBackend for NetworkControl {
    fn kind(&self) -> Capability {
        Capability::Network
    }

    async fn exists(&self, display: &DisplayRecord) -> bool {
        self.relay
            .get(&format!("displays/{}/ping", display.serial))
            .await
            .is_ok()
    }

    async fn read(&self, display: &DisplayRecord, command: Command) -> Result<i64, ControlError> {
        let body = json!({ "command": command.as_str() });
        let response = self
            .relay
            .post(&format!("displays/{}/read", display.serial), body)
            .await?;
        response
            .get("value")
            .and_then(Value::as_i64)
            .ok_or_else(|| ControlError::Relay(format!("missing value in {response}")))
    }

    async fn write(
        &self,
        display: &DisplayRecord,
        command: Command,
        value: i64,
    ) -> Result<(), ControlError> {
        let body = json!({ "command": command.as_str(), "value": value });
        self.relay
            .post(&format!("displays/{}/write", display.serial), body)
            .await?;
        Ok(())
    }

    async fn is_responsive(&self, display: &DisplayRecord) -> bool {
        self.relay
            .get(&format!("displays/{}/ping", display.serial))
            .await
            .is_ok()
    }

    async fn reset_state(&self, record: &DisplayRecord) -> Result<(), ControlError> {
        if let Err(e) = self
            .relay
            .post(&format!("displays/{}/reset", record.serial), json!({}))
            .await
        {
            warn!(serial = %record.serial, error = %e, "relay reset failed");
            return Err(e);
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
