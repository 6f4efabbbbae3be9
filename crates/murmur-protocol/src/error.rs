//! Error types for the protocol layer.
//!
//! Each crate in Murmur defines its own error enum. A `ProtocolError`
//! always means the bytes or names a client sent could not be turned into
//! protocol types; it never means the network or the database failed.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing field, an
    /// unknown `type` tag or role.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but violates a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A room name contains characters outside `[A-Za-z0-9_-]` or has
    /// the wrong length.
    #[error("invalid room id: {0:?}")]
    InvalidRoomId(String),
}
