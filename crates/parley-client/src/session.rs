//! Session assembly: one coordinator wired to the real backend per
//! authenticated session.

use parley_net::{spawn_channel, ApiClient, ChannelConfig};
use parley_shared::models::User;

use crate::coordinator::SyncCoordinator;

/// Where and how to reach the backend.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base HTTP(S) URL for the REST API.
    pub server_url: String,
    /// Push channel settings (shares the server URL by default).
    pub channel: ChannelConfig,
}

impl SessionConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        let server_url = server_url.into();
        Self {
            channel: ChannelConfig {
                server_url: server_url.clone(),
                ..ChannelConfig::default()
            },
            server_url,
        }
    }
}

/// One authenticated session: stores, channel, and coordinator live exactly
/// as long as this value. Logging out tears everything down; logging in
/// again builds a fresh session from scratch.
pub struct SyncSession {
    coordinator: SyncCoordinator<ApiClient>,
}

impl SyncSession {
    /// Start a session with the given credential token and local user.
    ///
    /// Must be called within a tokio runtime; the channel and routing tasks
    /// are spawned immediately and the channel begins connecting in the
    /// background.
    pub fn start(config: SessionConfig, token: impl Into<String>, self_user: User) -> Self {
        let token = token.into();
        let SessionConfig {
            server_url,
            channel,
        } = config;
        let api = ApiClient::new(server_url.as_str(), token.as_str());
        let handle = spawn_channel(channel, token.as_str());
        let coordinator = SyncCoordinator::new(api, handle, self_user);
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &SyncCoordinator<ApiClient> {
        &self.coordinator
    }

    /// End the session: close the channel and drop all local state.
    pub async fn logout(self) {
        self.coordinator.shutdown().await;
    }
}
