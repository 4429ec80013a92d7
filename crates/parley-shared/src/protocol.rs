//! The JSON wire protocol spoken over the push channel.
//!
//! Every frame is an envelope of the form `{"event": <name>, "data": <payload>}`.
//! [`ServerEvent`] covers inbound frames, [`ClientCommand`] outbound ones;
//! both serialize to the same envelope shape so a test harness can speak
//! either side.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::models::{Conversation, Message, User};
use crate::types::{ConversationId, MessageId};

/// Events pushed by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A message was created in a conversation the client joined.
    NewMessage(Message),
    /// A conversation changed (new activity, membership, rename).
    ConversationUpdated(Conversation),
    /// The seen-by set of a message changed.
    MessageSeen(MessageSeen),
    /// Application-level channel error. Non-fatal.
    Error(ErrorDetail),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageSeen {
    pub message_id: MessageId,
    /// Authoritative seen-by set after the change.
    #[serde(default)]
    pub seen_by: Vec<User>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
}

/// Commands emitted by the client. No acknowledgement is awaited; delivery
/// confirmation arrives, if at all, as a later [`ServerEvent`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Join a conversation room so its events are delivered.
    JoinConversation(ConversationId),
    /// Send a message. The stored message comes back as `new_message`.
    SendMessage(OutboundMessage),
    /// Mark a single message as seen by this user.
    MarkSeen(MarkSeen),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub conversation_id: ConversationId,
    pub content: String,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarkSeen {
    pub message_id: MessageId,
}

impl ServerEvent {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl ClientCommand {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
