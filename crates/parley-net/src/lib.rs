//! # parley-net
//!
//! Network plumbing for the sync client: the typed HTTP API wrapper used for
//! pulls and mutations, and the persistent push channel.
//!
//! The channel runs in a dedicated tokio task and is driven through typed
//! command and notification mpsc channels, keeping the networking layer fully
//! asynchronous and decoupled from the state layer. It reconnects on its own
//! with exponential backoff and falls back from WebSocket to long-polling
//! when the socket upgrade is unavailable.

pub mod api;
pub mod backoff;
pub mod channel;
pub mod config;

mod error;

pub use api::{ApiClient, BackendApi};
pub use channel::{spawn_channel, ChannelCommand, ChannelHandle, ChannelNotification};
pub use config::ChannelConfig;
pub use error::{NetError, Result};
