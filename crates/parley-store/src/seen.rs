//! Exactly-once seen-acknowledgement tracking.

use std::collections::HashSet;

use parley_shared::models::Message;
use parley_shared::types::{MessageId, UserId};

/// Decides which messages still need a seen-acknowledgement.
///
/// A message qualifies when it was authored by someone else and the local
/// user is not in its seen-by set. The tracker remembers every identity it
/// has already returned, so repeated scans over an unchanged sequence emit
/// nothing — the authoritative `seen_by` field only catches up once the
/// backend's `message_seen` event comes back.
#[derive(Debug, Default)]
pub struct SeenTracker {
    requested: HashSet<MessageId>,
}

impl SeenTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the identities newly requiring acknowledgement, recording them
    /// so no identity is ever returned twice. The caller emits one
    /// `mark_seen` command per returned id.
    ///
    /// System messages are never acknowledged.
    pub fn scan(&mut self, messages: &[Message], self_id: &UserId) -> Vec<MessageId> {
        let mut out = Vec::new();
        for message in messages {
            if message.is_system || &message.sender.id == self_id {
                continue;
            }
            if message.seen_by_contains(self_id) {
                continue;
            }
            if self.requested.insert(message.id.clone()) {
                out.push(message.id.clone());
            }
        }
        out
    }

    pub fn is_requested(&self, id: &MessageId) -> bool {
        self.requested.contains(id)
    }

    /// Forget all acknowledged identities. Used on session teardown.
    pub fn reset(&mut self) {
        self.requested.clear();
    }
}
