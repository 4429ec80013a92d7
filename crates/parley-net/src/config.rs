//! Channel configuration.

use std::time::Duration;

use crate::error::{NetError, Result};

/// Configuration for the push channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Base HTTP(S) URL of the backend, e.g. `http://localhost:8000`.
    pub server_url: String,
    /// First reconnect delay.
    pub backoff_base: Duration,
    /// Reconnect delay cap.
    pub backoff_max: Duration,
    /// Jitter applied to each delay, as a fraction (0.2 = ±20%).
    pub backoff_jitter: f64,
    /// Capacity of the command and notification channels.
    pub buffer: usize,
    /// Whether to fall back to long-polling when the WebSocket upgrade fails.
    pub poll_fallback: bool,
    /// How long a single long-poll request may be held open.
    pub poll_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            backoff_jitter: 0.2,
            buffer: 256,
            poll_fallback: true,
            poll_timeout: Duration::from_secs(35),
        }
    }
}

impl ChannelConfig {
    /// The WebSocket endpoint, with the credential token attached the way
    /// the backend expects it (handshake query parameter).
    pub fn ws_url(&self, token: &str) -> Result<String> {
        let base = if let Some(rest) = self.server_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.server_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(NetError::InvalidUrl(self.server_url.clone()));
        };
        Ok(format!("{}/ws?token={token}", base.trim_end_matches('/')))
    }

    /// The long-poll endpoint returning batched event frames.
    pub fn poll_url(&self, token: &str) -> Result<String> {
        Ok(format!("{}/poll?token={token}", self.http_base()?))
    }

    /// The endpoint accepting outbound command frames in polling mode.
    pub fn emit_url(&self, token: &str) -> Result<String> {
        Ok(format!("{}/emit?token={token}", self.http_base()?))
    }

    fn http_base(&self) -> Result<&str> {
        if self.server_url.starts_with("http://") || self.server_url.starts_with("https://") {
            Ok(self.server_url.trim_end_matches('/'))
        } else {
            Err(NetError::InvalidUrl(self.server_url.clone()))
        }
    }
}
