//! The ordered conversation list ("most recently active first").

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::warn;

use parley_shared::models::Conversation;
use parley_shared::types::ConversationId;

/// Ordered collection of conversations, unique by identity.
///
/// Order is kept as a front-pushed deque of ids with lazy stale-entry
/// skipping: promoting a conversation pushes its id to the front and leaves
/// the old position behind as a stale duplicate, which reads skip and a
/// periodic compaction sweep removes. This keeps `upsert_and_promote`
/// amortized O(1).
#[derive(Debug, Default)]
pub struct ConversationStore {
    by_id: HashMap<ConversationId, Conversation>,
    order: VecDeque<ConversationId>,
    stale: usize,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire list with a freshly pulled snapshot, order as
    /// received from the backend (most recent first). Duplicate identities
    /// in the snapshot are dropped, keeping the first occurrence.
    pub fn replace_all(&mut self, conversations: Vec<Conversation>) {
        self.by_id.clear();
        self.order.clear();
        self.stale = 0;
        for conversation in conversations {
            if self.by_id.contains_key(&conversation.id) {
                warn!(conversation = %conversation.id, "Duplicate conversation in snapshot, dropping");
                continue;
            }
            self.order.push_back(conversation.id.clone());
            self.by_id.insert(conversation.id.clone(), conversation);
        }
    }

    /// Insert or update a conversation and move it to the front of the
    /// order. Never creates duplicates.
    pub fn upsert_and_promote(&mut self, conversation: Conversation) {
        let id = conversation.id.clone();
        if self.by_id.insert(id.clone(), conversation).is_some() {
            // The previous position in `order` becomes stale.
            self.stale += 1;
        }
        self.order.push_front(id);
        if self.stale > self.by_id.len() {
            self.compact();
        }
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.by_id.get(id)
    }

    /// Snapshot of the list in current order, front = most recent.
    pub fn all(&self) -> Vec<Conversation> {
        let mut seen = HashSet::with_capacity(self.by_id.len());
        let mut out = Vec::with_capacity(self.by_id.len());
        for id in &self.order {
            if seen.insert(id) {
                if let Some(conversation) = self.by_id.get(id) {
                    out.push(conversation.clone());
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Rebuild `order` without stale duplicates, keeping first occurrences.
    fn compact(&mut self) {
        let mut seen = HashSet::with_capacity(self.by_id.len());
        self.order.retain(|id| seen.insert(id.clone()));
        self.stale = 0;
    }
}
