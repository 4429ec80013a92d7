//! The message sequence of the active conversation.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use parley_shared::models::{Message, User};
use parley_shared::types::MessageId;

/// Append-only, de-duplicated, insertion-ordered message sequence.
///
/// Insertion order is arrival order, not timestamp order: the backend is
/// trusted to deliver a conversation's messages in causal order, and a
/// message's position is fixed at append time.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    index: HashMap<MessageId, usize>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Establish the baseline from a pulled history, order as supplied by
    /// the backend. Duplicate identities keep their first occurrence.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages.clear();
        self.index.clear();
        for message in messages {
            if self.index.contains_key(&message.id) {
                warn!(message = %message.id, "Duplicate message in history, dropping");
                continue;
            }
            self.index.insert(message.id.clone(), self.messages.len());
            self.messages.push(message);
        }
    }

    /// De-duplicating append. Returns `false` (and leaves the sequence
    /// untouched) if a message with the same identity is already present —
    /// this is how an echoed send and a racing pull converge on one entry.
    pub fn append(&mut self, message: Message) -> bool {
        if self.index.contains_key(&message.id) {
            debug!(message = %message.id, "Message already present, ignoring");
            return false;
        }
        self.index.insert(message.id.clone(), self.messages.len());
        self.messages.push(message);
        true
    }

    /// Replace the seen-by set of a message from the backend's authoritative
    /// state. No-op if the message is not loaded locally.
    ///
    /// The backend promises the set only grows; if an update would drop a
    /// previously present user, the regression is logged and the union is
    /// applied instead.
    pub fn update_seen_by(&mut self, id: &MessageId, seen_by: Vec<User>) -> bool {
        let Some(&pos) = self.index.get(id) else {
            debug!(message = %id, "Seen update for unloaded message, ignoring");
            return false;
        };
        let message = &mut self.messages[pos];

        let incoming: HashSet<_> = seen_by.iter().map(|u| u.id.clone()).collect();
        let dropped: Vec<User> = message
            .seen_by
            .iter()
            .filter(|u| !incoming.contains(&u.id))
            .cloned()
            .collect();

        let mut next = seen_by;
        if !dropped.is_empty() {
            warn!(
                message = %id,
                dropped = dropped.len(),
                "Seen-by set regressed, applying union instead"
            );
            next.extend(dropped);
        }
        message.seen_by = next;
        true
    }

    /// Empty the sequence. Called when switching the active conversation.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.index.clear();
    }

    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.index.get(id).map(|&pos| &self.messages[pos])
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
