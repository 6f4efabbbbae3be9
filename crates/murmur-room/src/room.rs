//! Room actor: an isolated Tokio task that owns one chat room.
//!
//! The actor holds the room's history, its store and its peers, and
//! processes one command at a time. Store calls are awaited inside command
//! handling, so a write always finishes before the next command for the
//! room is looked at.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use murmur_protocol::{Codec, Envelope, JsonCodec, Message, PeerId, Recipient, RoomId};
use murmur_store::MessageStore;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::{MessageLog, RoomConfig, RoomError};

/// An outbound message from the room actor to a peer's connection handler.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomOutbound {
    /// The full history, sent once to a peer right after it joins.
    Snapshot(Vec<Message>),
    /// A payload another peer sent, forwarded byte-for-byte.
    Relay(Arc<str>),
}

/// Channel sender for delivering outbound messages to a peer.
///
/// Bounded: a peer that stops reading is dropped from the room once its
/// queue fills up, rather than buffering the room's traffic without limit.
pub type PeerSender = mpsc::Sender<RoomOutbound>;

/// Commands sent to a room actor through its channel.
///
/// Variants with a `oneshot::Sender` are request/response: the caller
/// waits for the actor's answer on that channel.
#[derive(Debug)]
enum RoomCommand {
    Join {
        peer: PeerId,
        sender: PeerSender,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    Leave {
        peer: PeerId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    /// A raw payload from a peer (fire-and-forget).
    Relay { sender: PeerId, payload: Arc<str> },

    Snapshot {
        reply: oneshot::Sender<Vec<Message>>,
    },

    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },

    Shutdown,
}

/// Room metadata (not the history itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    /// Number of peers currently connected.
    pub peer_count: usize,
    /// Number of messages in the history.
    pub message_count: usize,
}

/// Handle to a running room actor. Used to send commands to it.
///
/// Cheap to clone: it wraps an `mpsc::Sender`. The
/// [`RoomManager`](crate::RoomManager) keeps one per active room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Returns `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Adds a peer. The room answers with a [`RoomOutbound::Snapshot`] on
    /// `sender` before anything else is delivered to it.
    pub async fn join(&self, peer: PeerId, sender: PeerSender) -> Result<(), RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Join { peer, sender, reply }).await?;
        rx.await.map_err(|_| self.unavailable())?
    }

    pub async fn leave(&self, peer: PeerId) -> Result<(), RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Leave { peer, reply }).await?;
        rx.await.map_err(|_| self.unavailable())?
    }

    /// Hands a peer's raw payload to the room (fire-and-forget).
    pub async fn relay(&self, sender: PeerId, payload: impl Into<Arc<str>>) -> Result<(), RoomError> {
        self.send(RoomCommand::Relay {
            sender,
            payload: payload.into(),
        })
        .await
    }

    /// The current history.
    pub async fn snapshot(&self) -> Result<Vec<Message>, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    pub async fn get_info(&self) -> Result<RoomInfo, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::GetInfo { reply }).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Tells the room to stop. Commands already queued are processed
    /// first.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.send(RoomCommand::Shutdown).await
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.sender.send(cmd).await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> RoomError {
        RoomError::Unavailable(self.room_id.clone())
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomState<S> {
    room_id: RoomId,
    config: RoomConfig,
    history: MessageLog,
    store: S,
    peers: HashMap<PeerId, PeerSender>,
    codec: JsonCodec,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl<S: MessageStore> RoomState<S> {
    async fn run(mut self) {
        tracing::info!(
            room_id = %self.room_id,
            messages = self.history.len(),
            "room actor started"
        );

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join { peer, sender, reply } => {
                    let _ = reply.send(self.handle_join(peer, sender));
                }
                RoomCommand::Leave { peer, reply } => {
                    let _ = reply.send(self.handle_leave(peer));
                }
                RoomCommand::Relay { sender, payload } => {
                    self.handle_relay(sender, payload).await;
                }
                RoomCommand::Snapshot { reply } => {
                    let _ = reply.send(self.history.snapshot());
                }
                RoomCommand::GetInfo { reply } => {
                    let _ = reply.send(self.info());
                }
                RoomCommand::Shutdown => {
                    tracing::info!(room_id = %self.room_id, "room shutting down");
                    break;
                }
            }
        }

        tracing::info!(room_id = %self.room_id, "room actor stopped");
    }

    fn handle_join(&mut self, peer: PeerId, sender: PeerSender) -> Result<(), RoomError> {
        if self.peers.contains_key(&peer) {
            return Err(RoomError::AlreadyJoined(peer, self.room_id.clone()));
        }

        // Delivered in the same command that registers the peer, so no relay
        // can overtake it.
        let snapshot = RoomOutbound::Snapshot(self.history.snapshot());
        self.peers.insert(peer, sender);
        self.dispatch(Recipient::Peer(peer), snapshot);

        tracing::info!(
            room_id = %self.room_id,
            %peer,
            peers = self.peers.len(),
            "peer joined"
        );
        Ok(())
    }

    fn handle_leave(&mut self, peer: PeerId) -> Result<(), RoomError> {
        if self.peers.remove(&peer).is_none() {
            return Err(RoomError::NotJoined(peer, self.room_id.clone()));
        }
        tracing::info!(
            room_id = %self.room_id,
            %peer,
            peers = self.peers.len(),
            "peer left"
        );
        Ok(())
    }

    async fn handle_relay(&mut self, sender: PeerId, payload: Arc<str>) {
        if !self.peers.contains_key(&sender) {
            tracing::warn!(
                room_id = %self.room_id,
                %sender,
                "payload from non-member, ignoring"
            );
            return;
        }

        let parsed = self.codec.decode::<Envelope>(&payload);

        if self.config.validate_before_relay && parsed.is_err() {
            tracing::warn!(
                room_id = %self.room_id,
                %sender,
                "malformed payload dropped"
            );
            return;
        }

        self.dispatch(Recipient::AllExcept(sender), RoomOutbound::Relay(payload));

        match parsed {
            Ok(envelope) => {
                let kind = envelope.kind();
                match envelope.into_delta() {
                    Some(message) => self.apply(message).await,
                    None => tracing::debug!(
                        room_id = %self.room_id,
                        %sender,
                        kind,
                        "envelope not applied"
                    ),
                }
            }
            Err(e) => {
                tracing::warn!(
                    room_id = %self.room_id,
                    %sender,
                    error = %e,
                    "malformed payload relayed but not applied"
                );
            }
        }
    }

    /// Stamps a message with the server's clock and writes it to the
    /// history, then through to the store.
    async fn apply(&mut self, mut message: Message) {
        message.created_at = Some(timestamp());

        let outcome = self.history.upsert(message.clone());
        tracing::debug!(
            room_id = %self.room_id,
            message_id = %message.id,
            ?outcome,
            "message applied"
        );

        if let Err(e) = self.store.upsert_message(&message).await {
            tracing::error!(
                room_id = %self.room_id,
                message_id = %message.id,
                error = %e,
                "failed to persist message"
            );
        }
    }

    /// Sends an outbound message to every peer `recipient` covers.
    ///
    /// Peers whose connection is gone are skipped; their handler leaves the
    /// room on its own. Peers whose queue is full are removed, which closes
    /// their queue and with it their connection.
    fn dispatch(&mut self, recipient: Recipient, outbound: RoomOutbound) {
        let mut lagging = Vec::new();
        for (peer, sender) in &self.peers {
            if !recipient.includes(*peer) {
                continue;
            }
            if let Err(TrySendError::Full(_)) = sender.try_send(outbound.clone()) {
                lagging.push(*peer);
            }
        }

        for peer in lagging {
            self.peers.remove(&peer);
            tracing::warn!(
                room_id = %self.room_id,
                %peer,
                peers = self.peers.len(),
                "peer queue full, dropping peer"
            );
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id.clone(),
            peer_count: self.peers.len(),
            message_count: self.history.len(),
        }
    }
}

/// Current time as RFC 3339 in UTC with millisecond precision, which
/// sorts correctly as text.
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Activates a room over `store` and spawns its actor.
///
/// Migrates the schema and loads the history before the actor starts;
/// if either fails, nothing is spawned and the error is returned.
pub async fn spawn_room<S: MessageStore>(
    room_id: RoomId,
    mut store: S,
    config: RoomConfig,
) -> Result<RoomHandle, RoomError> {
    store.migrate().await?;
    let history = MessageLog::from(store.load_messages().await?);

    let (tx, rx) = mpsc::channel(config.channel_size.max(1));
    let actor = RoomState {
        room_id: room_id.clone(),
        config,
        history,
        store,
        peers: HashMap::new(),
        codec: JsonCodec,
        receiver: rx,
    };
    tokio::spawn(actor.run());

    Ok(RoomHandle { room_id, sender: tx })
}
