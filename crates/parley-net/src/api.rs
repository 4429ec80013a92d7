//! Typed wrapper over the backend's request/response API.

use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use parley_shared::models::{Conversation, FriendRequest, Message, User};
use parley_shared::types::{ConversationId, UserId};

use crate::error::{NetError, Result};

/// The pull/mutate surface the coordinator depends on.
///
/// Implemented by [`ApiClient`] against the real backend and by in-process
/// fakes in tests. Request/response errors are not retried at this layer.
#[allow(async_fn_in_trait)]
pub trait BackendApi {
    /// `GET /conversations` — full list, most recent first.
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    /// `GET /messages/{conversationId}` — chronological history.
    async fn list_messages(&self, conversation: &ConversationId) -> Result<Vec<Message>>;

    /// `POST /conversations/private` — create or retrieve the 1:1
    /// conversation with `member`.
    async fn create_private(&self, member: &UserId) -> Result<Conversation>;

    /// `POST /conversations/group`.
    async fn create_group(
        &self,
        name: &str,
        members: &[UserId],
        avatar: Option<&str>,
    ) -> Result<Conversation>;

    /// `GET /friends` — accepted friends.
    async fn list_friends(&self) -> Result<Vec<User>>;

    /// `GET /users` — everyone visible to this account.
    async fn list_users(&self) -> Result<Vec<User>>;

    /// `GET /friends/pending` — requests awaiting this user's answer.
    async fn pending_requests(&self) -> Result<Vec<FriendRequest>>;

    /// `GET /friends/sent` — requests this user sent.
    async fn sent_requests(&self) -> Result<Vec<FriendRequest>>;

    /// `POST /friends`.
    async fn send_friend_request(&self, recipient: &UserId) -> Result<FriendRequest>;

    /// `POST /friends/{requestId}/accept`.
    async fn accept_friend_request(&self, request: &str) -> Result<()>;

    /// `POST /friends/{requestId}/reject`.
    async fn reject_friend_request(&self, request: &str) -> Result<()>;
}

impl<T: BackendApi> BackendApi for std::sync::Arc<T> {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        (**self).list_conversations().await
    }

    async fn list_messages(&self, conversation: &ConversationId) -> Result<Vec<Message>> {
        (**self).list_messages(conversation).await
    }

    async fn create_private(&self, member: &UserId) -> Result<Conversation> {
        (**self).create_private(member).await
    }

    async fn create_group(
        &self,
        name: &str,
        members: &[UserId],
        avatar: Option<&str>,
    ) -> Result<Conversation> {
        (**self).create_group(name, members, avatar).await
    }

    async fn list_friends(&self) -> Result<Vec<User>> {
        (**self).list_friends().await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        (**self).list_users().await
    }

    async fn pending_requests(&self) -> Result<Vec<FriendRequest>> {
        (**self).pending_requests().await
    }

    async fn sent_requests(&self) -> Result<Vec<FriendRequest>> {
        (**self).sent_requests().await
    }

    async fn send_friend_request(&self, recipient: &UserId) -> Result<FriendRequest> {
        (**self).send_friend_request(recipient).await
    }

    async fn accept_friend_request(&self, request: &str) -> Result<()> {
        (**self).accept_friend_request(request).await
    }

    async fn reject_friend_request(&self, request: &str) -> Result<()> {
        (**self).reject_friend_request(request).await
    }
}

/// HTTP client for the backend REST API, authenticated with the session's
/// bearer token.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "GET");
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;
        decode(response).await
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T> {
        debug!(path, "POST");
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        decode(response).await
    }

    async fn post_unit(&self, path: &str) -> Result<()> {
        debug!(path, "POST");
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(NetError::Api {
            status: status.as_u16(),
            message: error_message(status.as_u16(), &body),
        })
    }
}

impl BackendApi for ApiClient {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.get_json("/conversations").await
    }

    async fn list_messages(&self, conversation: &ConversationId) -> Result<Vec<Message>> {
        self.get_json(&format!("/messages/{conversation}")).await
    }

    async fn create_private(&self, member: &UserId) -> Result<Conversation> {
        self.post_json("/conversations/private", &json!({ "memberId": member }))
            .await
    }

    async fn create_group(
        &self,
        name: &str,
        members: &[UserId],
        avatar: Option<&str>,
    ) -> Result<Conversation> {
        self.post_json(
            "/conversations/group",
            &json!({ "name": name, "memberIds": members, "avatar": avatar }),
        )
        .await
    }

    async fn list_friends(&self) -> Result<Vec<User>> {
        self.get_json("/friends").await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.get_json("/users").await
    }

    async fn pending_requests(&self) -> Result<Vec<FriendRequest>> {
        self.get_json("/friends/pending").await
    }

    async fn sent_requests(&self) -> Result<Vec<FriendRequest>> {
        self.get_json("/friends/sent").await
    }

    async fn send_friend_request(&self, recipient: &UserId) -> Result<FriendRequest> {
        self.post_json("/friends", &json!({ "recipientId": recipient }))
            .await
    }

    async fn accept_friend_request(&self, request: &str) -> Result<()> {
        self.post_unit(&format!("/friends/{request}/accept")).await
    }

    async fn reject_friend_request(&self, request: &str) -> Result<()> {
        self.post_unit(&format!("/friends/{request}/reject")).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let body = response.text().await.unwrap_or_default();
    Err(NetError::Api {
        status: status.as_u16(),
        message: error_message(status.as_u16(), &body),
    })
}

/// Pull the backend's human-readable `message` field out of an error body,
/// falling back to the bare status code.
fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {status}"))
}
