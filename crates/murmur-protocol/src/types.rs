//! Core protocol types for Murmur's wire format.
//!
//! Everything in this module travels "on the wire": it is serialized to
//! JSON, sent over a WebSocket, and parsed again by the browser client.
//! The JSON shapes are fixed by the client, so the serde attributes here
//! matter as much as the types themselves.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a connected peer.
///
/// Newtype over `u64`, same as the transport's connection id it is derived
/// from. Peers have no identity beyond this number: it exists so a room can
/// leave the sender out of a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Maximum length of a room name.
pub const MAX_ROOM_ID_LEN: usize = 64;

/// The name of a chat room.
///
/// Room names come from the connection path, so they are untrusted. Only
/// ASCII letters, digits, `-` and `_` are accepted, which also makes a
/// name safe to use as a file name for the room's database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Validates `name` and wraps it.
    pub fn parse(name: &str) -> Result<Self, ProtocolError> {
        let valid_len = !name.is_empty() && name.len() <= MAX_ROOM_ID_LEN;
        let valid_chars = name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid_len && valid_chars {
            Ok(Self(name.to_owned()))
        } else {
            Err(ProtocolError::InvalidRoomId(name.to_owned()))
        }
    }

    /// Returns the room name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Recipient: who should receive an outbound message?
// ---------------------------------------------------------------------------

/// Specifies which peers of a room receive an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// One specific peer (e.g. the snapshot for a newly joined peer).
    Peer(PeerId),

    /// Everyone except the given peer. Used for relaying a peer's own
    /// message back to the rest of the room.
    AllExcept(PeerId),
}

impl Recipient {
    /// Returns `true` if `peer` is addressed by this recipient.
    pub fn includes(&self, peer: PeerId) -> bool {
        match self {
            Self::Peer(target) => *target == peer,
            Self::AllExcept(excluded) => *excluded != peer,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// The lowercase name used on the wire and in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown role {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat message as stored in a room's history.
///
/// `id` is unique within a room; a second message with the same id replaces
/// the first. The optional fields are skipped when serializing so a message
/// without them looks exactly like what the client originally sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub user: String,
    pub role: Role,

    /// Server-stamped write time, RFC 3339 with millisecond precision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_device: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_account: Option<String>,
}

impl Message {
    /// Creates a message with no timestamp or client metadata.
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        user: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            user: user.into(),
            role,
            created_at: None,
            user_ip: None,
            user_device: None,
            user_account: None,
        }
    }

    /// Sets `created_at`, replacing any previous value.
    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Envelope: the top-level wire format
// ---------------------------------------------------------------------------

/// Every message on the wire is an `Envelope`.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON, so an add
/// looks like:
///
/// ```text
/// {"type":"add","id":"m1","content":"hi","user":"Alice","role":"user"}
/// ```
///
/// and the join snapshot like `{"type":"all","messages":[...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Client → Server: a new message.
    Add(Message),

    /// Client → Server: an edit of an existing message. Same shape as
    /// `Add`; only the tag differs.
    Update(Message),

    /// Server → Client: the room's full history, sent once on join.
    All { messages: Vec<Message> },
}

impl Envelope {
    /// Returns the wire tag of this envelope (`"add"`, `"update"`, `"all"`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Update(_) => "update",
            Self::All { .. } => "all",
        }
    }

    /// Consumes an `Add` or `Update` and returns its message.
    /// Returns `None` for `All`, which clients never get to apply.
    pub fn into_delta(self) -> Option<Message> {
        match self {
            Self::Add(msg) | Self::Update(msg) => Some(msg),
            Self::All { .. } => None,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
