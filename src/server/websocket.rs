//! WebSocket sessions
//!
//! ## Protocol
//!
//! Messages (client → server):
//! - `connect` - Identify as a player; must come first
//! - `subscribe` - Listen on a destination under a client-chosen id
//! - `unsubscribe` - Stop listening
//! - `chat` - Public message, or private when `receiver_id` is set
//! - `command` - Run a coordinator, relationship or registry operation
//! - `ping` - Keep-alive
//!
//! Messages (server → client):
//! - `connected`, `subscribed`, `unsubscribed`, `pong`
//! - `event` - An envelope delivered on one of the session's subscriptions
//! - `result` / `error` - Command outcome, correlated by `request_id`
//!
//! ```json
//! {"type": "connect", "player_id": "5d0c..."}
//! {"type": "subscribe", "id": "inbox", "destination": "/player/5d0c.../private"}
//! {"type": "chat", "content": "gg"}
//! ```

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::commands::{execute, Command};
use super::AppState;
use crate::auth::Actor;
use crate::model::Player;
use crate::realtime::{private_destination, Envelope, MessageType, WireEnvelope, PUBLIC_TOPIC};
use crate::types::{ClashError, ErrorResponse, Result};

/// Largest chat message accepted, in bytes
pub const MAX_CHAT_BYTES: usize = 4096;

// ============================================================================
// Message Types
// ============================================================================

/// Message received from client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Connect {
        player_id: Uuid,
    },
    Subscribe {
        id: String,
        destination: String,
    },
    Unsubscribe {
        id: String,
    },
    Chat {
        content: String,
        #[serde(default)]
        receiver_id: Option<Uuid>,
    },
    Command {
        #[serde(default)]
        request_id: Option<String>,
        command: Command,
    },
    Ping,
}

/// Message sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        player: Player,
    },
    Subscribed {
        id: String,
        destination: String,
    },
    Unsubscribed {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        destination: Option<String>,
    },
    Event {
        subscription: String,
        envelope: WireEnvelope,
    },
    Result {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        data: Value,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        error: ErrorResponse,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
}

// ============================================================================
// Session
// ============================================================================

/// State of one connected client, independent of the socket
pub struct Session {
    id: Uuid,
    state: Arc<AppState>,
    outbound: mpsc::Sender<ServerMessage>,
    player: Option<Player>,
    subscriptions: HashMap<String, JoinHandle<()>>,
}

impl Session {
    pub fn new(state: Arc<AppState>, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state,
            outbound,
            player: None,
            subscriptions: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn player_id(&self) -> Option<Uuid> {
        self.player.as_ref().map(|p| p.id)
    }

    /// Parse and handle one text frame
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle(message).await,
            Err(e) => {
                debug!(session_id = %self.id, "Unparseable frame: {}", e);
                self.send_error(None, None, ClashError::from(e));
            }
        }
    }

    pub async fn handle(&mut self, message: ClientMessage) {
        if let ClientMessage::Ping = message {
            self.send(ServerMessage::Pong {
                timestamp: Utc::now(),
            });
            return;
        }
        if let ClientMessage::Connect { player_id } = message {
            match self.connect(player_id).await {
                Ok(player) => self.send(ServerMessage::Connected { player }),
                Err(e) => self.send_error(None, Some("connect"), e),
            }
            return;
        }

        let Some(actor) = self.player.as_ref().map(Actor::from_player) else {
            self.send_error(
                None,
                None,
                ClashError::PermissionDenied("Connect before sending other messages".into()),
            );
            return;
        };

        match message {
            ClientMessage::Subscribe { id, destination } => {
                match self.subscribe(&actor, id.clone(), destination.clone()) {
                    Ok(()) => self.send(ServerMessage::Subscribed { id, destination }),
                    Err(e) => self.send_error(None, Some("subscribe"), e),
                }
            }
            ClientMessage::Unsubscribe { id } => {
                let destination = self.unsubscribe(&id);
                self.send(ServerMessage::Unsubscribed { id, destination });
            }
            ClientMessage::Chat {
                content,
                receiver_id,
            } => {
                if let Err(e) = self.chat(&actor, content, receiver_id) {
                    self.send_error(None, Some("chat"), e);
                }
            }
            ClientMessage::Command {
                request_id,
                command,
            } => {
                let name = command.name();
                match execute(&self.state, &actor, command).await {
                    Ok(data) => self.send(ServerMessage::Result { request_id, data }),
                    Err(e) => {
                        debug!(session_id = %self.id, command = name, "Command failed: {}", e);
                        self.send_error(request_id, Some(name), e);
                    }
                }
            }
            ClientMessage::Connect { .. } | ClientMessage::Ping => {}
        }
    }

    async fn connect(&mut self, player_id: Uuid) -> Result<Player> {
        if self.player.is_some() {
            return Err(ClashError::IllegalState("Session already connected".into()));
        }
        let player = if self.state.args.dev_mode {
            self.state.players.get_or_register(player_id).await?
        } else {
            self.state.players.get(player_id).await?
        };
        self.state.presence.connect(player.id);
        info!(session_id = %self.id, player_id = %player.id, "Session connected");
        self.player = Some(player.clone());
        Ok(player)
    }

    fn subscribe(&mut self, actor: &Actor, id: String, destination: String) -> Result<()> {
        authorize_destination(actor, &destination)?;
        if let Some(previous) = self.subscriptions.remove(&id) {
            previous.abort();
        }

        let mut rx = self.state.transport.subscribe(&destination);
        self.state
            .presence
            .subscribe(self.subscription_key(&id), destination.clone());

        let outbound = self.outbound.clone();
        let subscription = id.clone();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        let event = ServerMessage::Event {
                            subscription: subscription.clone(),
                            envelope: WireEnvelope::from(&envelope),
                        };
                        // Waiting here lets a slow reader fall behind on the
                        // broadcast buffer instead of growing this queue
                        if outbound.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            subscription = %subscription,
                            skipped,
                            "Subscriber lagged, envelopes dropped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.subscriptions.insert(id, handle);
        Ok(())
    }

    fn unsubscribe(&mut self, id: &str) -> Option<String> {
        if let Some(handle) = self.subscriptions.remove(id) {
            handle.abort();
        }
        self.state.presence.unsubscribe(&self.subscription_key(id))
    }

    fn chat(&self, actor: &Actor, content: String, receiver_id: Option<Uuid>) -> Result<usize> {
        if content.len() > MAX_CHAT_BYTES {
            return Err(ClashError::InvalidArgument(format!(
                "Chat messages are limited to {} bytes",
                MAX_CHAT_BYTES
            )));
        }
        let envelope =
            Envelope::addressed(None, receiver_id, content.into_bytes(), MessageType::Chat);
        match receiver_id {
            Some(_) => self.state.dispatcher.private_message(envelope, actor.player_id),
            None => Ok(self.state.dispatcher.public_message(envelope, actor.player_id)),
        }
    }

    /// Drop every subscription and mark the player OFFLINE
    pub fn close(&mut self) {
        let subscriptions: Vec<(String, JoinHandle<()>)> = self.subscriptions.drain().collect();
        for (id, handle) in subscriptions {
            handle.abort();
            self.state.presence.unsubscribe(&self.subscription_key(&id));
        }
        if let Some(player) = self.player.take() {
            self.state.presence.disconnect(player.id);
            info!(session_id = %self.id, player_id = %player.id, "Session closed");
        }
    }

    /// Subscription ids are client-chosen, so scope them to the session
    fn subscription_key(&self, id: &str) -> String {
        format!("{}:{}", self.id, id)
    }

    fn send(&self, message: ServerMessage) {
        match self.outbound.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session_id = %self.id, "Outbound queue full, reply dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(session_id = %self.id, "Outbound channel closed");
            }
        }
    }

    fn send_error(&self, request_id: Option<String>, path: Option<&str>, error: ClashError) {
        let mut body = error.to_response();
        if let Some(path) = path {
            body = body.with_path(path);
        }
        self.send(ServerMessage::Error {
            request_id,
            error: body,
        });
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Players may listen on the public topic, other `/topic/` destinations and
/// their own private destination only
fn authorize_destination(actor: &Actor, destination: &str) -> Result<()> {
    if destination == PUBLIC_TOPIC || destination.starts_with("/topic/") {
        return Ok(());
    }
    if destination.starts_with("/player/") {
        if destination == private_destination(actor.player_id) {
            return Ok(());
        }
        return Err(ClashError::PermissionDenied(
            "Cannot subscribe to another player's destination".into(),
        ));
    }
    Err(ClashError::InvalidArgument(format!(
        "Unknown destination {}",
        destination
    )))
}

// ============================================================================
// Connection Handler
// ============================================================================

/// Frames a session may have queued for its socket
fn session_queue_capacity(state: &AppState) -> usize {
    state.args.channel_capacity.max(1)
}

/// Drive one WebSocket connection until either side closes it
pub async fn handle_connection(
    state: Arc<AppState>,
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();

    let (outbound, mut outbound_rx) = mpsc::channel(session_queue_capacity(&state));
    let mut session = Session::new(state, outbound);
    debug!(session_id = %session.id(), %addr, "WebSocket session opened");

    loop {
        tokio::select! {
            Some(message) = outbound_rx.recv() => {
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(session_id = %session.id(), "Failed to encode frame: {}", e);
                        continue;
                    }
                };
                if sink.send(WsMessage::Text(json)).await.is_err() {
                    break;
                }
            }

            frame = source.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => session.handle_text(&text).await,
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sink.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(session_id = %session.id(), %addr, "WebSocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    session.close();
    Ok(())
}
