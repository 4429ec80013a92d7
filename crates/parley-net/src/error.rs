use thiserror::Error;

use parley_shared::ProtocolError;

/// Errors produced by the networking layer.
#[derive(Error, Debug)]
pub enum NetError {
    /// HTTP transport failure (connect, timeout, body).
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// WebSocket-level failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The backend answered with a non-success status. `message` carries the
    /// backend's own description when it supplied one.
    #[error("Backend returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The configured server URL has an unsupported scheme.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// A frame could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NetError>;
