//! The persistent push channel.
//!
//! One channel task per session, driven through typed command and
//! notification mpsc channels. The task owns the physical connection
//! exclusively: it authenticates with the session token, reconnects with
//! exponential backoff when the link drops, and re-joins the last joined
//! conversation room after every reconnect. When the WebSocket upgrade is
//! unavailable it falls back to HTTP long-polling for that attempt.

use std::pin::pin;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use parley_shared::protocol::{ClientCommand, ServerEvent};
use parley_shared::types::{ConversationId, LinkState};

use crate::backoff::Backoff;
use crate::config::ChannelConfig;
use crate::error::{NetError, Result};

const EMIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Commands sent *into* the channel task.
#[derive(Debug, Clone)]
pub enum ChannelCommand {
    /// Send a command frame to the backend. Not queued while the link is
    /// down (offline queuing is out of scope); joins are remembered so the
    /// room is entered once the link comes back.
    Emit(ClientCommand),
    /// Gracefully close the channel and end the task.
    Shutdown,
}

/// Notifications sent *from* the channel task to the application.
#[derive(Debug, Clone)]
pub enum ChannelNotification {
    /// The link was (re)established. Fires on every reconnect.
    Up,
    /// The link was lost; reconnection proceeds in the background.
    Down,
    /// An event frame arrived from the backend.
    Event(ServerEvent),
}

/// Handle to a running channel task.
pub struct ChannelHandle {
    pub commands: mpsc::Sender<ChannelCommand>,
    pub notifications: mpsc::Receiver<ChannelNotification>,
    pub state: watch::Receiver<LinkState>,
}

/// Spawn the channel task for one session.
///
/// Never fails synchronously: the task starts in `Connecting` and keeps
/// retrying until it is shut down.
pub fn spawn_channel(config: ChannelConfig, token: impl Into<String>) -> ChannelHandle {
    let token = token.into();
    let (cmd_tx, cmd_rx) = mpsc::channel(config.buffer);
    let (notif_tx, notif_rx) = mpsc::channel(config.buffer);
    let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);

    tokio::spawn(channel_task(config, token, cmd_rx, notif_tx, state_tx));

    ChannelHandle {
        commands: cmd_tx,
        notifications: notif_rx,
        state: state_rx,
    }
}

enum LinkOutcome {
    Lost,
    Shutdown,
}

async fn channel_task(
    config: ChannelConfig,
    token: String,
    mut cmd_rx: mpsc::Receiver<ChannelCommand>,
    notif_tx: mpsc::Sender<ChannelNotification>,
    state_tx: watch::Sender<LinkState>,
) {
    let mut backoff = Backoff::new(config.backoff_base, config.backoff_max, config.backoff_jitter);
    let mut last_join: Option<ConversationId> = None;
    let http = reqwest::Client::new();

    loop {
        let _ = state_tx.send(LinkState::Connecting);

        match establish(&config, &token, &http).await {
            Ok(mut link) => {
                backoff.reset();
                let _ = state_tx.send(LinkState::Connected);
                let _ = notif_tx.send(ChannelNotification::Up).await;
                info!(transport = link.name(), "Channel connected");

                // Re-enter the active room before anything else so pushes
                // for it resume immediately.
                if let Some(ref id) = last_join {
                    if let Err(e) = link.send(&ClientCommand::JoinConversation(id.clone())).await {
                        warn!(error = %e, "Failed to re-join conversation after reconnect");
                    }
                }

                let outcome = run_link(link, &mut cmd_rx, &notif_tx, &mut last_join).await;
                let _ = state_tx.send(LinkState::Disconnected);
                match outcome {
                    LinkOutcome::Shutdown => break,
                    LinkOutcome::Lost => {
                        let _ = notif_tx.send(ChannelNotification::Down).await;
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "Connection attempt failed");
                let _ = state_tx.send(LinkState::Disconnected);
            }
        }

        let delay = backoff.next_delay();
        debug!(delay_ms = delay.as_millis() as u64, "Reconnecting after backoff");
        if let LinkOutcome::Shutdown = wait_backoff(delay, &mut cmd_rx, &mut last_join).await {
            break;
        }
    }

    let _ = state_tx.send(LinkState::Disconnected);
    info!("Channel task terminated");
}

/// Sleep out the backoff while still consuming commands: joins update the
/// room to re-enter, other emits are dropped (no offline queue), shutdown
/// ends the task.
async fn wait_backoff(
    delay: Duration,
    cmd_rx: &mut mpsc::Receiver<ChannelCommand>,
    last_join: &mut Option<ConversationId>,
) -> LinkOutcome {
    let mut sleep = pin!(tokio::time::sleep(delay));
    loop {
        tokio::select! {
            _ = &mut sleep => return LinkOutcome::Lost,
            cmd = cmd_rx.recv() => match cmd {
                Some(ChannelCommand::Emit(cmd)) => {
                    if let ClientCommand::JoinConversation(id) = cmd {
                        *last_join = Some(id);
                    } else {
                        warn!("Channel down, dropping outbound command");
                    }
                }
                Some(ChannelCommand::Shutdown) | None => return LinkOutcome::Shutdown,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

enum Link {
    Ws(WsStream),
    Poll(PollLink),
}

impl Link {
    fn name(&self) -> &'static str {
        match self {
            Link::Ws(_) => "websocket",
            Link::Poll(_) => "polling",
        }
    }

    async fn send(&mut self, cmd: &ClientCommand) -> Result<()> {
        let text = cmd.to_json()?;
        match self {
            Link::Ws(ws) => ws.send(WsMessage::text(text)).await?,
            Link::Poll(poll) => poll.emit(&text).await?,
        }
        Ok(())
    }
}

struct PollLink {
    http: reqwest::Client,
    poll_url: String,
    emit_url: String,
    poll_timeout: Duration,
    /// Events returned by the probing poll that established the link.
    pending: Vec<ServerEvent>,
}

impl PollLink {
    async fn emit(&self, frame: &str) -> Result<()> {
        let response = self
            .http
            .post(&self.emit_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(frame.to_string())
            .timeout(EMIT_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NetError::Api {
                status: status.as_u16(),
                message: format!("emit rejected with HTTP {status}"),
            });
        }
        Ok(())
    }

    async fn poll(&self) -> Result<Vec<ServerEvent>> {
        poll_once(&self.http, &self.poll_url, self.poll_timeout).await
    }
}

/// Try the WebSocket first; fall back to long-polling (verified by one
/// successful poll) when the upgrade fails and fallback is enabled.
async fn establish(config: &ChannelConfig, token: &str, http: &reqwest::Client) -> Result<Link> {
    let ws_url = config.ws_url(token)?;
    match connect_async(&ws_url).await {
        Ok((ws, _response)) => return Ok(Link::Ws(ws)),
        Err(e) if config.poll_fallback => {
            debug!(error = %e, "WebSocket unavailable, trying long-poll");
        }
        Err(e) => return Err(e.into()),
    }

    let poll_url = config.poll_url(token)?;
    let pending = poll_once(http, &poll_url, config.poll_timeout).await?;
    Ok(Link::Poll(PollLink {
        http: http.clone(),
        poll_url,
        emit_url: config.emit_url(token)?,
        poll_timeout: config.poll_timeout,
        pending,
    }))
}

async fn run_link(
    link: Link,
    cmd_rx: &mut mpsc::Receiver<ChannelCommand>,
    notif_tx: &mpsc::Sender<ChannelNotification>,
    last_join: &mut Option<ConversationId>,
) -> LinkOutcome {
    match link {
        Link::Ws(ws) => run_ws(ws, cmd_rx, notif_tx, last_join).await,
        Link::Poll(poll) => run_poll(poll, cmd_rx, notif_tx, last_join).await,
    }
}

async fn run_ws(
    ws: WsStream,
    cmd_rx: &mut mpsc::Receiver<ChannelCommand>,
    notif_tx: &mpsc::Sender<ChannelNotification>,
    last_join: &mut Option<ConversationId>,
) -> LinkOutcome {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(ChannelCommand::Emit(cmd)) => {
                    track_join(&cmd, last_join);
                    let text = match cmd.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode command frame");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(WsMessage::text(text)).await {
                        warn!(error = %e, "WebSocket send failed");
                        return LinkOutcome::Lost;
                    }
                }
                Some(ChannelCommand::Shutdown) | None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return LinkOutcome::Shutdown;
                }
            },

            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => dispatch_frame(text.as_str(), notif_tx).await,
                Some(Ok(WsMessage::Ping(payload))) => {
                    let _ = sink.send(WsMessage::Pong(payload)).await;
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("WebSocket closed by server");
                    return LinkOutcome::Lost;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket receive failed");
                    return LinkOutcome::Lost;
                }
            },
        }
    }
}

async fn run_poll(
    mut link: PollLink,
    cmd_rx: &mut mpsc::Receiver<ChannelCommand>,
    notif_tx: &mpsc::Sender<ChannelNotification>,
    last_join: &mut Option<ConversationId>,
) -> LinkOutcome {
    for event in std::mem::take(&mut link.pending) {
        let _ = notif_tx.send(ChannelNotification::Event(event)).await;
    }

    // The in-flight poll is pinned outside the select loop so a command
    // arriving mid-poll does not cancel it.
    let mut poll = pin!(link.poll());

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(ChannelCommand::Emit(cmd)) => {
                    track_join(&cmd, last_join);
                    let text = match cmd.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode command frame");
                            continue;
                        }
                    };
                    if let Err(e) = link.emit(&text).await {
                        warn!(error = %e, "Long-poll emit failed");
                        return LinkOutcome::Lost;
                    }
                }
                Some(ChannelCommand::Shutdown) | None => return LinkOutcome::Shutdown,
            },

            result = &mut poll => {
                match result {
                    Ok(events) => {
                        for event in events {
                            let _ = notif_tx.send(ChannelNotification::Event(event)).await;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Long-poll cycle failed");
                        return LinkOutcome::Lost;
                    }
                }
                poll.set(link.poll());
            },
        }
    }
}

fn track_join(cmd: &ClientCommand, last_join: &mut Option<ConversationId>) {
    if let ClientCommand::JoinConversation(id) = cmd {
        *last_join = Some(id.clone());
    }
}

async fn dispatch_frame(text: &str, notif_tx: &mpsc::Sender<ChannelNotification>) {
    match ServerEvent::from_json(text) {
        Ok(event) => {
            let _ = notif_tx.send(ChannelNotification::Event(event)).await;
        }
        Err(e) => debug!(error = %e, "Ignoring unrecognized frame"),
    }
}

/// One long-poll cycle: a held GET answering with a JSON array of event
/// frames. Frames that fail to parse are skipped, not fatal.
async fn poll_once(
    http: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<ServerEvent>> {
    let response = http.get(url).timeout(timeout).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(NetError::Api {
            status: status.as_u16(),
            message: format!("poll rejected with HTTP {status}"),
        });
    }
    let frames: Vec<serde_json::Value> = response.json().await?;
    let mut events = Vec::with_capacity(frames.len());
    for frame in frames {
        match serde_json::from_value::<ServerEvent>(frame) {
            Ok(event) => events.push(event),
            Err(e) => debug!(error = %e, "Ignoring unrecognized polled frame"),
        }
    }
    Ok(events)
}
