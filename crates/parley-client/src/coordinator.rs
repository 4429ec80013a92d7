//! The composition root: wires channel notifications into the stores and
//! exposes the operations the UI layer depends on.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use parley_net::{BackendApi, ChannelCommand, ChannelHandle, ChannelNotification};
use parley_shared::models::{Conversation, FriendRequest, Message, User};
use parley_shared::protocol::{ClientCommand, MarkSeen, OutboundMessage, ServerEvent};
use parley_shared::types::{ConversationId, LinkState, MessageId, UserId};
use parley_store::{ConversationStore, MessageStore, SeenTracker};

use crate::error::ClientError;

/// The active conversation pointer and its message sequence live behind one
/// lock, so event routing reads the pointer atomically with the dispatch —
/// a push for a conversation that is no longer active can never land in the
/// new view.
#[derive(Default)]
struct ActiveView {
    conversation: Option<ConversationId>,
    messages: MessageStore,
}

/// Session-scoped orchestrator.
///
/// Exclusively owns the conversation and message stores for the lifetime of
/// one authenticated session; the channel handle's command side is the only
/// path to the backend's push channel. All store mutations are serialized
/// behind the stores' mutexes.
pub struct SyncCoordinator<A> {
    api: A,
    self_user: User,
    commands: mpsc::Sender<ChannelCommand>,
    link_state: watch::Receiver<LinkState>,
    conversations: Arc<Mutex<ConversationStore>>,
    active: Arc<Mutex<ActiveView>>,
    seen: Arc<Mutex<SeenTracker>>,
    routing: JoinHandle<()>,
}

impl<A: BackendApi> SyncCoordinator<A> {
    /// Wire a coordinator to a channel and spawn its event routing task.
    pub fn new(api: A, channel: ChannelHandle, self_user: User) -> Self {
        let ChannelHandle {
            commands,
            notifications,
            state,
        } = channel;
        let conversations = Arc::new(Mutex::new(ConversationStore::new()));
        let active = Arc::new(Mutex::new(ActiveView::default()));
        let seen = Arc::new(Mutex::new(SeenTracker::new()));
        let routing = tokio::spawn(route_notifications(
            notifications,
            commands.clone(),
            conversations.clone(),
            active.clone(),
            seen.clone(),
        ));
        Self {
            api,
            self_user,
            commands,
            link_state: state,
            conversations,
            active,
            seen,
            routing,
        }
    }

    pub fn self_user(&self) -> &User {
        &self.self_user
    }

    pub fn link_state(&self) -> LinkState {
        *self.link_state.borrow()
    }

    // ------------------------------------------------------------------
    // Pulls
    // ------------------------------------------------------------------

    /// Pull the full conversation list and replace the store. On failure
    /// the store is left untouched.
    pub async fn load_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        let list = self.api.list_conversations().await?;
        info!(count = list.len(), "Loaded conversations");
        self.with_conversations(|store| store.replace_all(list.clone()))?;
        Ok(list)
    }

    /// Switch the active conversation: clear the message view, pull the
    /// history, and join the conversation's room so pushes resume.
    ///
    /// The active pointer changes together with the clear, so a push for
    /// the previous conversation arriving mid-switch is dropped rather than
    /// misattributed.
    pub async fn load_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, ClientError> {
        self.with_active(|view| {
            view.conversation = Some(conversation.clone());
            view.messages.clear();
        })?;

        let history = self.api.list_messages(conversation).await?;
        info!(conversation = %conversation, count = history.len(), "Loaded message history");

        self.with_active(|view| {
            // A later switch may have won while the pull was in flight.
            if view.conversation.as_ref() == Some(conversation) {
                view.messages.replace_all(history.clone());
            }
        })?;

        self.emit(ClientCommand::JoinConversation(conversation.clone()))
            .await?;
        Ok(history)
    }

    // ------------------------------------------------------------------
    // Sends
    // ------------------------------------------------------------------

    /// Server-confirmed optimistic send: nothing is inserted locally, the
    /// message appears when the backend echoes it back as `new_message`.
    pub async fn send_message(
        &self,
        conversation: &ConversationId,
        content: &str,
        images: Vec<String>,
    ) -> Result<(), ClientError> {
        let content = content.trim();
        if content.is_empty() && images.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        self.emit(ClientCommand::SendMessage(OutboundMessage {
            conversation_id: conversation.clone(),
            content: content.to_string(),
            images,
        }))
        .await
    }

    /// Acknowledge a single message, bypassing the seen tracker. Used by
    /// viewport-visibility callers.
    pub async fn mark_seen(&self, message: &MessageId) -> Result<(), ClientError> {
        self.emit(ClientCommand::MarkSeen(MarkSeen {
            message_id: message.clone(),
        }))
        .await
    }

    /// Scan the active view and acknowledge every foreign message the user
    /// has not seen, at most once per message while the link stays up. The
    /// ledger is dropped when the link goes down, so a message whose
    /// acknowledgement was lost in the disconnect is re-emitted by the next
    /// scan; already-confirmed messages stay quiet via their `seen_by` set.
    /// Returns how many acknowledgements were emitted.
    pub async fn mark_visible_seen(&self) -> Result<usize, ClientError> {
        let pending = {
            let view = self.active.lock().map_err(|_| ClientError::StatePoisoned)?;
            let mut tracker = self.seen.lock().map_err(|_| ClientError::StatePoisoned)?;
            tracker.scan(view.messages.all(), &self.self_user.id)
        };
        let count = pending.len();
        for id in pending {
            self.emit(ClientCommand::MarkSeen(MarkSeen { message_id: id }))
                .await?;
        }
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Conversation creation
    // ------------------------------------------------------------------

    /// Create (or retrieve) the 1:1 conversation with `member`, refresh the
    /// list, and hand the conversation back for immediate activation.
    pub async fn create_private_conversation(
        &self,
        member: &UserId,
    ) -> Result<Conversation, ClientError> {
        let conversation = self.api.create_private(member).await?;
        self.load_conversations().await?;
        Ok(conversation)
    }

    pub async fn create_group_conversation(
        &self,
        name: &str,
        members: &[UserId],
        avatar: Option<&str>,
    ) -> Result<Conversation, ClientError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::EmptyGroupName);
        }
        if members.is_empty() {
            return Err(ClientError::NoMembers);
        }
        let conversation = self.api.create_group(name, members, avatar).await?;
        self.load_conversations().await?;
        Ok(conversation)
    }

    // ------------------------------------------------------------------
    // Friends
    // ------------------------------------------------------------------

    pub async fn friends(&self) -> Result<Vec<User>, ClientError> {
        Ok(self.api.list_friends().await?)
    }

    pub async fn users(&self) -> Result<Vec<User>, ClientError> {
        Ok(self.api.list_users().await?)
    }

    pub async fn pending_requests(&self) -> Result<Vec<FriendRequest>, ClientError> {
        Ok(self.api.pending_requests().await?)
    }

    pub async fn sent_requests(&self) -> Result<Vec<FriendRequest>, ClientError> {
        Ok(self.api.sent_requests().await?)
    }

    pub async fn add_friend(&self, recipient: &UserId) -> Result<FriendRequest, ClientError> {
        Ok(self.api.send_friend_request(recipient).await?)
    }

    pub async fn accept_friend(&self, request: &str) -> Result<(), ClientError> {
        Ok(self.api.accept_friend_request(request).await?)
    }

    pub async fn reject_friend(&self, request: &str) -> Result<(), ClientError> {
        Ok(self.api.reject_friend_request(request).await?)
    }

    // ------------------------------------------------------------------
    // Snapshots for rendering
    // ------------------------------------------------------------------

    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations
            .lock()
            .map(|store| store.all())
            .unwrap_or_default()
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<Conversation> {
        self.conversations
            .lock()
            .ok()
            .and_then(|store| store.get(id).cloned())
    }

    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.active
            .lock()
            .ok()
            .and_then(|view| view.conversation.clone())
    }

    pub fn active_messages(&self) -> Vec<Message> {
        self.active
            .lock()
            .map(|view| view.messages.all().to_vec())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Close the channel and discard the session's stores.
    pub async fn shutdown(self) {
        if self
            .commands
            .send(ChannelCommand::Shutdown)
            .await
            .is_err()
        {
            self.routing.abort();
        }
        let _ = self.routing.await;
    }

    async fn emit(&self, cmd: ClientCommand) -> Result<(), ClientError> {
        self.commands
            .send(ChannelCommand::Emit(cmd))
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }

    fn with_conversations<R>(
        &self,
        f: impl FnOnce(&mut ConversationStore) -> R,
    ) -> Result<R, ClientError> {
        let mut store = self
            .conversations
            .lock()
            .map_err(|_| ClientError::StatePoisoned)?;
        Ok(f(&mut store))
    }

    fn with_active<R>(&self, f: impl FnOnce(&mut ActiveView) -> R) -> Result<R, ClientError> {
        let mut view = self.active.lock().map_err(|_| ClientError::StatePoisoned)?;
        Ok(f(&mut view))
    }
}

/// Routing loop: one dispatch target per session, installed at construction.
async fn route_notifications(
    mut notifications: mpsc::Receiver<ChannelNotification>,
    commands: mpsc::Sender<ChannelCommand>,
    conversations: Arc<Mutex<ConversationStore>>,
    active: Arc<Mutex<ActiveView>>,
    seen: Arc<Mutex<SeenTracker>>,
) {
    info!("Event routing started");

    while let Some(notification) = notifications.recv().await {
        match notification {
            ChannelNotification::Up => {
                // Re-establish room membership for whatever is active now;
                // the channel's own re-join only knows the last join it saw.
                let rejoin = active
                    .lock()
                    .ok()
                    .and_then(|view| view.conversation.clone());
                if let Some(id) = rejoin {
                    debug!(conversation = %id, "Link up, joining active conversation");
                    let _ = commands
                        .send(ChannelCommand::Emit(ClientCommand::JoinConversation(id)))
                        .await;
                }
            }

            ChannelNotification::Down => {
                debug!("Link down, reconnection runs in background");
                // Acknowledgements racing the disconnect may never have left
                // the machine. Forget the ledger so the next scan re-emits
                // for anything still unseen; confirmed messages are filtered
                // out by their seen_by set.
                if let Ok(mut tracker) = seen.lock() {
                    tracker.reset();
                }
            }

            ChannelNotification::Event(event) => route_event(event, &conversations, &active),
        }
    }

    info!("Event routing ended");
}

fn route_event(
    event: ServerEvent,
    conversations: &Arc<Mutex<ConversationStore>>,
    active: &Arc<Mutex<ActiveView>>,
) {
    match event {
        ServerEvent::NewMessage(message) => {
            let Ok(mut view) = active.lock() else { return };
            if view.conversation.as_ref() == Some(&message.conversation_id) {
                view.messages.append(message);
            } else {
                debug!(
                    conversation = %message.conversation_id,
                    "Push for inactive conversation, ignoring"
                );
            }
        }

        ServerEvent::ConversationUpdated(conversation) => {
            let Ok(mut store) = conversations.lock() else { return };
            debug!(conversation = %conversation.id, "Conversation updated");
            store.upsert_and_promote(conversation);
        }

        ServerEvent::MessageSeen(seen) => {
            let Ok(mut view) = active.lock() else { return };
            view.messages.update_seen_by(&seen.message_id, seen.seen_by);
        }

        ServerEvent::Error(detail) => {
            // Application-level channel error; never fatal to the session.
            warn!(message = %detail.message, "Channel error event");
        }
    }
}
