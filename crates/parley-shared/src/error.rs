use thiserror::Error;

/// Errors from decoding or encoding wire frames.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Frame encode/decode error: {0}")]
    Json(#[from] serde_json::Error),
}
