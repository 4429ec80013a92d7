//! Coordinator behavior with an injected channel and a fake backend API:
//! pull/push reconciliation, de-duplication, the active-conversation guard,
//! seen scanning, and validation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use parley_client::{ClientError, SyncCoordinator};
use parley_net::{
    BackendApi, ChannelCommand, ChannelHandle, ChannelNotification, NetError,
    Result as NetResult,
};
use parley_shared::models::{Conversation, ConversationKind, FriendRequest, Message, User};
use parley_shared::protocol::{ClientCommand, MessageSeen, ServerEvent};
use parley_shared::types::{ConversationId, LinkState, UserId};

const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn user(id: &str) -> User {
    User {
        id: id.into(),
        username: format!("user-{id}"),
        avatar: None,
    }
}

fn self_user() -> User {
    user("self")
}

fn conversation(id: &str) -> Conversation {
    Conversation {
        id: id.into(),
        kind: ConversationKind::Group,
        name: Some(format!("room {id}")),
        avatar: None,
        members: vec![self_user(), user("other")],
        last_message: None,
        updated_at: Utc::now(),
    }
}

fn message(id: &str, conversation: &str, sender: &str) -> Message {
    Message {
        id: id.into(),
        conversation_id: conversation.into(),
        sender: user(sender),
        content: format!("message {id}"),
        images: Vec::new(),
        seen_by: Vec::new(),
        is_system: false,
        created_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Fake backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeApi {
    conversations: Mutex<Vec<Conversation>>,
    messages: Mutex<HashMap<ConversationId, Vec<Message>>>,
    fail: AtomicBool,
}

impl FakeApi {
    fn check(&self) -> NetResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NetError::Api {
                status: 500,
                message: "backend exploded".to_string(),
            });
        }
        Ok(())
    }

    fn set_messages(&self, conversation: &str, messages: Vec<Message>) {
        self.messages
            .lock()
            .unwrap()
            .insert(conversation.into(), messages);
    }
}

impl BackendApi for FakeApi {
    async fn list_conversations(&self) -> NetResult<Vec<Conversation>> {
        self.check()?;
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn list_messages(&self, conversation: &ConversationId) -> NetResult<Vec<Message>> {
        self.check()?;
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(conversation)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_private(&self, member: &UserId) -> NetResult<Conversation> {
        self.check()?;
        let created = Conversation {
            id: format!("private-{member}").as_str().into(),
            kind: ConversationKind::Private,
            name: None,
            avatar: None,
            members: vec![self_user(), user(member.as_str())],
            last_message: None,
            updated_at: Utc::now(),
        };
        self.conversations.lock().unwrap().insert(0, created.clone());
        Ok(created)
    }

    async fn create_group(
        &self,
        name: &str,
        members: &[UserId],
        _avatar: Option<&str>,
    ) -> NetResult<Conversation> {
        self.check()?;
        let created = Conversation {
            id: format!("group-{name}").as_str().into(),
            kind: ConversationKind::Group,
            name: Some(name.to_string()),
            avatar: None,
            members: members.iter().map(|m| user(m.as_str())).collect(),
            last_message: None,
            updated_at: Utc::now(),
        };
        self.conversations.lock().unwrap().insert(0, created.clone());
        Ok(created)
    }

    async fn list_friends(&self) -> NetResult<Vec<User>> {
        Ok(Vec::new())
    }

    async fn list_users(&self) -> NetResult<Vec<User>> {
        Ok(Vec::new())
    }

    async fn pending_requests(&self) -> NetResult<Vec<FriendRequest>> {
        Ok(Vec::new())
    }

    async fn sent_requests(&self) -> NetResult<Vec<FriendRequest>> {
        Ok(Vec::new())
    }

    async fn send_friend_request(&self, _recipient: &UserId) -> NetResult<FriendRequest> {
        Err(NetError::Api {
            status: 501,
            message: "not in fake".to_string(),
        })
    }

    async fn accept_friend_request(&self, _request: &str) -> NetResult<()> {
        Ok(())
    }

    async fn reject_friend_request(&self, _request: &str) -> NetResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    coordinator: SyncCoordinator<Arc<FakeApi>>,
    api: Arc<FakeApi>,
    cmd_rx: mpsc::Receiver<ChannelCommand>,
    notif_tx: mpsc::Sender<ChannelNotification>,
    _state_tx: watch::Sender<LinkState>,
}

fn harness() -> Harness {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (notif_tx, notif_rx) = mpsc::channel(64);
    let (state_tx, state_rx) = watch::channel(LinkState::Connected);
    let api = Arc::new(FakeApi::default());
    let handle = ChannelHandle {
        commands: cmd_tx,
        notifications: notif_rx,
        state: state_rx,
    };
    let coordinator = SyncCoordinator::new(api.clone(), handle, self_user());
    Harness {
        coordinator,
        api,
        cmd_rx,
        notif_tx,
        _state_tx: state_tx,
    }
}

impl Harness {
    async fn push(&self, event: ServerEvent) {
        self.notif_tx
            .send(ChannelNotification::Event(event))
            .await
            .unwrap();
    }

    async fn next_emit(&mut self) -> ClientCommand {
        match timeout(WAIT, self.cmd_rx.recv()).await.unwrap().unwrap() {
            ChannelCommand::Emit(cmd) => cmd,
            other => panic!("expected Emit, got {other:?}"),
        }
    }

    fn assert_no_emit(&mut self) {
        assert!(self.cmd_rx.try_recv().is_err(), "unexpected command emitted");
    }

    /// Wait until the routing task has applied a condition, or fail.
    async fn eventually(&self, check: impl Fn(&SyncCoordinator<Arc<FakeApi>>) -> bool) {
        for _ in 0..200 {
            if check(&self.coordinator) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition never became true");
    }

    /// Give the routing task time to process anything in flight.
    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn active_ids(coordinator: &SyncCoordinator<Arc<FakeApi>>) -> Vec<String> {
    coordinator
        .active_messages()
        .into_iter()
        .map(|m| m.id.0)
        .collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_conversation_list_loads_cleanly() -> anyhow::Result<()> {
    let h = harness();
    let list = h.coordinator.load_conversations().await?;
    assert!(list.is_empty());
    assert!(h.coordinator.conversations().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_pull_leaves_store_untouched() {
    let h = harness();
    *h.api.conversations.lock().unwrap() = vec![conversation("a")];
    h.coordinator.load_conversations().await.unwrap();

    h.api.fail.store(true, Ordering::SeqCst);
    let err = h.coordinator.load_conversations().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Net(NetError::Api { status: 500, .. })
    ));
    assert_eq!(h.coordinator.conversations().len(), 1);
}

#[tokio::test]
async fn send_message_validates_then_emits_one_command() {
    let mut h = harness();

    let err = h
        .coordinator
        .send_message(&"c1".into(), "   ", Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::EmptyMessage));
    h.assert_no_emit();

    h.coordinator
        .send_message(&"c1".into(), " hi ", Vec::new())
        .await
        .unwrap();
    match h.next_emit().await {
        ClientCommand::SendMessage(out) => {
            assert_eq!(out.conversation_id.as_str(), "c1");
            assert_eq!(out.content, "hi");
        }
        other => panic!("expected SendMessage, got {other:?}"),
    }

    // Image-only messages are valid.
    h.coordinator
        .send_message(&"c1".into(), "", vec!["img.png".to_string()])
        .await
        .unwrap();
    assert!(matches!(h.next_emit().await, ClientCommand::SendMessage(_)));
}

#[tokio::test]
async fn echoed_send_and_racing_pull_converge_on_one_message() {
    let mut h = harness();
    h.coordinator.load_messages(&"c1".into()).await.unwrap();
    assert!(matches!(
        h.next_emit().await,
        ClientCommand::JoinConversation(id) if id.as_str() == "c1"
    ));

    // The backend echoes the sent message.
    let echoed = message("m1", "c1", "self");
    h.push(ServerEvent::NewMessage(echoed.clone())).await;
    h.eventually(|c| active_ids(c) == ["m1"]).await;

    // A pull for the same conversation races in, already containing the
    // echoed message.
    h.api.set_messages("c1", vec![echoed.clone()]);
    h.coordinator.load_messages(&"c1".into()).await.unwrap();
    h.next_emit().await; // second join

    // The echo arrives again (server broadcast); still one message.
    h.push(ServerEvent::NewMessage(echoed)).await;
    h.settle().await;
    assert_eq!(active_ids(&h.coordinator), ["m1"]);
}

#[tokio::test]
async fn switching_conversations_drops_stale_pushes() -> anyhow::Result<()> {
    let mut h = harness();
    h.api.set_messages("x", vec![message("mx", "x", "other")]);
    h.api.set_messages("y", vec![message("my", "y", "other")]);

    h.coordinator.load_messages(&"x".into()).await?;
    h.next_emit().await;
    assert_eq!(active_ids(&h.coordinator), ["mx"]);

    h.coordinator.load_messages(&"y".into()).await?;
    h.next_emit().await;
    assert_eq!(h.coordinator.active_conversation(), Some("y".into()));

    // A push for the previous conversation lands after the switch.
    h.push(ServerEvent::NewMessage(message("mx2", "x", "other")))
        .await;
    h.settle().await;
    assert_eq!(active_ids(&h.coordinator), ["my"]);
    Ok(())
}

#[tokio::test]
async fn conversation_update_promotes_to_front() {
    let h = harness();
    *h.api.conversations.lock().unwrap() =
        vec![conversation("a"), conversation("b"), conversation("c")];
    h.coordinator.load_conversations().await.unwrap();

    let mut updated = conversation("b");
    updated.name = Some("renamed".to_string());
    h.push(ServerEvent::ConversationUpdated(updated)).await;

    h.eventually(|c| {
        let ids: Vec<_> = c.conversations().into_iter().map(|x| x.id.0).collect();
        ids == ["b", "a", "c"]
    })
    .await;
    assert_eq!(
        h.coordinator
            .conversation(&"b".into())
            .unwrap()
            .name
            .as_deref(),
        Some("renamed")
    );
}

#[tokio::test]
async fn unknown_conversation_update_inserts_at_front() {
    let h = harness();
    *h.api.conversations.lock().unwrap() = vec![conversation("a")];
    h.coordinator.load_conversations().await.unwrap();

    h.push(ServerEvent::ConversationUpdated(conversation("new")))
        .await;
    h.eventually(|c| c.conversations().first().map(|x| x.id.0.clone()) == Some("new".to_string()))
        .await;
    assert_eq!(h.coordinator.conversations().len(), 2);
}

#[tokio::test]
async fn seen_events_update_and_never_regress() {
    let mut h = harness();
    h.api.set_messages("c1", vec![message("m1", "c1", "other")]);
    h.coordinator.load_messages(&"c1".into()).await.unwrap();
    h.next_emit().await;

    h.push(ServerEvent::MessageSeen(MessageSeen {
        message_id: "m1".into(),
        seen_by: vec![user("u2"), user("u3")],
    }))
    .await;
    h.eventually(|c| c.active_messages()[0].seen_by.len() == 2)
        .await;

    // Regressed set from the backend: u3 missing. Union is applied.
    h.push(ServerEvent::MessageSeen(MessageSeen {
        message_id: "m1".into(),
        seen_by: vec![user("u2")],
    }))
    .await;
    h.settle().await;
    let seen = &h.coordinator.active_messages()[0].seen_by;
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().any(|u| u.id.as_str() == "u3"));
}

#[tokio::test]
async fn visible_scan_acknowledges_each_message_once() {
    let mut h = harness();
    let mut seen_by_self = message("c", "c1", "other");
    seen_by_self.seen_by = vec![self_user()];
    h.api.set_messages(
        "c1",
        vec![
            message("a", "c1", "self"),
            message("b", "c1", "other"),
            seen_by_self,
        ],
    );
    h.coordinator.load_messages(&"c1".into()).await.unwrap();
    h.next_emit().await;

    // Only B qualifies: foreign and unseen.
    assert_eq!(h.coordinator.mark_visible_seen().await.unwrap(), 1);
    match h.next_emit().await {
        ClientCommand::MarkSeen(mark) => assert_eq!(mark.message_id.as_str(), "b"),
        other => panic!("expected MarkSeen, got {other:?}"),
    }

    // Re-scanning the unchanged view emits nothing, even though the
    // backend's seen event has not come back yet.
    assert_eq!(h.coordinator.mark_visible_seen().await.unwrap(), 0);
    h.assert_no_emit();
}

#[tokio::test]
async fn link_down_forgets_unconfirmed_acknowledgements() -> anyhow::Result<()> {
    let mut h = harness();
    h.api.set_messages("c1", vec![message("b", "c1", "other")]);
    h.coordinator.load_messages(&"c1".into()).await?;
    h.next_emit().await;

    assert_eq!(h.coordinator.mark_visible_seen().await?, 1);
    h.next_emit().await;
    assert_eq!(h.coordinator.mark_visible_seen().await?, 0);

    // The link drops before the backend confirms; the acknowledgement may
    // never have left the machine. The next scan must re-emit it.
    h.notif_tx.send(ChannelNotification::Down).await.unwrap();
    h.settle().await;
    assert_eq!(h.coordinator.mark_visible_seen().await?, 1);
    match h.next_emit().await {
        ClientCommand::MarkSeen(mark) => assert_eq!(mark.message_id.as_str(), "b"),
        other => panic!("expected MarkSeen, got {other:?}"),
    }

    // Once the backend confirms, a later drop does not resurrect it.
    h.push(ServerEvent::MessageSeen(MessageSeen {
        message_id: "b".into(),
        seen_by: vec![self_user()],
    }))
    .await;
    h.notif_tx.send(ChannelNotification::Down).await.unwrap();
    h.settle().await;
    assert_eq!(h.coordinator.mark_visible_seen().await?, 0);
    h.assert_no_emit();
    Ok(())
}

#[tokio::test]
async fn group_creation_validates_before_network() {
    let mut h = harness();
    let err = h
        .coordinator
        .create_group_conversation("  ", &["u2".into()], None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::EmptyGroupName));

    let err = h
        .coordinator
        .create_group_conversation("team", &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NoMembers));
    h.assert_no_emit();

    let created = h
        .coordinator
        .create_group_conversation("team", &["u2".into(), "u3".into()], None)
        .await
        .unwrap();
    assert_eq!(created.name.as_deref(), Some("team"));
    // The list was refreshed after creation.
    assert_eq!(h.coordinator.conversations().len(), 1);
}

#[tokio::test]
async fn private_creation_refreshes_and_returns_conversation() -> anyhow::Result<()> {
    let h = harness();
    let created = h.coordinator.create_private_conversation(&"u2".into()).await?;
    assert_eq!(created.kind, ConversationKind::Private);
    assert_eq!(
        created.display_name(&h.coordinator.self_user().id),
        "user-u2"
    );
    assert_eq!(h.coordinator.conversations().len(), 1);
    Ok(())
}

#[tokio::test]
async fn link_up_rejoins_active_conversation() {
    let mut h = harness();
    h.coordinator.load_messages(&"c1".into()).await.unwrap();
    h.next_emit().await;

    h.notif_tx.send(ChannelNotification::Up).await.unwrap();
    assert!(matches!(
        h.next_emit().await,
        ClientCommand::JoinConversation(id) if id.as_str() == "c1"
    ));
}

#[tokio::test]
async fn channel_error_events_are_not_fatal() {
    let mut h = harness();
    h.api.set_messages("c1", vec![message("m1", "c1", "other")]);
    h.coordinator.load_messages(&"c1".into()).await.unwrap();
    h.next_emit().await;

    h.push(ServerEvent::Error(parley_shared::protocol::ErrorDetail {
        message: "not a member".to_string(),
    }))
    .await;
    h.settle().await;

    // The session keeps working.
    h.coordinator
        .send_message(&"c1".into(), "still here", Vec::new())
        .await
        .unwrap();
    assert!(matches!(h.next_emit().await, ClientCommand::SendMessage(_)));
}
