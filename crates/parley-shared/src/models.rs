//! Domain models as served by the backend.
//!
//! Field names follow the backend's JSON exactly (`_id` primary keys,
//! camelCase elsewhere) so payloads from both the REST API and the push
//! channel deserialize into the same structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, MessageId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user identity as the backend supplies it. Immutable at this layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    /// Avatar reference (URL or data URI), if the user has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Private,
    Group,
}

/// A private or group conversation.
///
/// `members` carries fully populated [`User`]s; for `Private` conversations
/// the backend guarantees exactly two of them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(rename = "_id")]
    pub id: ConversationId,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    /// Group name. Unset for private conversations (the name is derived
    /// from the counterpart member instead).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub members: Vec<User>,
    /// Most recent message, populated by the backend for list rendering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
    /// Activity timestamp used for most-recent-first ordering.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// The member that is not `viewer`, for private conversations.
    pub fn counterpart(&self, viewer: &UserId) -> Option<&User> {
        self.members.iter().find(|m| &m.id != viewer)
    }

    /// Name to render: a group's own name, or the counterpart's username
    /// for a private conversation.
    pub fn display_name(&self, viewer: &UserId) -> String {
        match self.kind {
            ConversationKind::Group => self.name.clone().unwrap_or_default(),
            ConversationKind::Private => self
                .counterpart(viewer)
                .map(|u| u.username.clone())
                .unwrap_or_else(|| "Unknown User".to_string()),
        }
    }

    /// Avatar to render: the conversation's own avatar if set, otherwise the
    /// counterpart's avatar for private conversations.
    pub fn display_avatar(&self, viewer: &UserId) -> Option<&str> {
        if let Some(ref avatar) = self.avatar {
            return Some(avatar);
        }
        match self.kind {
            ConversationKind::Group => None,
            ConversationKind::Private => self
                .counterpart(viewer)
                .and_then(|u| u.avatar.as_deref()),
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message. `content` and `images` may not both be empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: User,
    #[serde(default)]
    pub content: String,
    /// Image references attached to the message.
    #[serde(default)]
    pub images: Vec<String>,
    /// Users who have seen this message. Grows monotonically.
    #[serde(default)]
    pub seen_by: Vec<User>,
    /// Backend-generated system message (member joined, renamed, ...).
    #[serde(default, rename = "isSystemMessage")]
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn seen_by_contains(&self, user: &UserId) -> bool {
        self.seen_by.iter().any(|u| &u.id == user)
    }
}

// ---------------------------------------------------------------------------
// Friend request
// ---------------------------------------------------------------------------

/// A pending or sent friend request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    #[serde(rename = "_id")]
    pub id: String,
    pub requester: User,
    pub recipient: User,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: &str, avatar: Option<&str>) -> User {
        User {
            id: id.into(),
            username: name.to_string(),
            avatar: avatar.map(str::to_string),
        }
    }

    fn private_conversation(members: Vec<User>) -> Conversation {
        Conversation {
            id: "c1".into(),
            kind: ConversationKind::Private,
            name: None,
            avatar: None,
            members,
            last_message: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn private_name_is_counterpart_username() {
        let conv = private_conversation(vec![user("me", "alice", None), user("u2", "bob", None)]);
        assert_eq!(conv.display_name(&"me".into()), "bob");
        assert_eq!(conv.display_name(&"u2".into()), "alice");
    }

    #[test]
    fn private_name_falls_back_when_counterpart_missing() {
        let conv = private_conversation(vec![user("me", "alice", None)]);
        assert_eq!(conv.display_name(&"me".into()), "Unknown User");
    }

    #[test]
    fn group_name_ignores_members() {
        let mut conv = private_conversation(vec![user("me", "alice", None), user("u2", "bob", None)]);
        conv.kind = ConversationKind::Group;
        conv.name = Some("lunch crew".to_string());
        assert_eq!(conv.display_name(&"me".into()), "lunch crew");
    }

    #[test]
    fn avatar_prefers_own_then_counterpart() {
        let mut conv = private_conversation(vec![
            user("me", "alice", Some("a.png")),
            user("u2", "bob", Some("b.png")),
        ]);
        assert_eq!(conv.display_avatar(&"me".into()), Some("b.png"));
        conv.avatar = Some("group.png".to_string());
        assert_eq!(conv.display_avatar(&"me".into()), Some("group.png"));
    }

    #[test]
    fn message_deserializes_backend_field_names() {
        let json = r#"{
            "_id": "m1",
            "conversationId": "c1",
            "sender": {"_id": "u1", "username": "bob"},
            "content": "hi",
            "images": [],
            "seenBy": [{"_id": "u2", "username": "alice"}],
            "isSystemMessage": false,
            "createdAt": "2024-05-01T12:00:00Z"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id.as_str(), "m1");
        assert_eq!(msg.sender.username, "bob");
        assert!(msg.seen_by_contains(&"u2".into()));
        assert!(!msg.seen_by_contains(&"u1".into()));
        assert!(!msg.is_system);
    }

    #[test]
    fn conversation_tolerates_missing_optional_fields() {
        let json = r#"{
            "_id": "c9",
            "type": "group",
            "name": "team",
            "members": [],
            "updatedAt": "2024-05-01T12:00:00Z"
        }"#;
        let conv: Conversation = serde_json::from_str(json).unwrap();
        assert_eq!(conv.kind, ConversationKind::Group);
        assert!(conv.last_message.is_none());
        assert!(conv.avatar.is_none());
    }
}
