//! Unified error type for Murmur.

use murmur_protocol::ProtocolError;
use murmur_room::RoomError;
use murmur_store::StoreError;
use murmur_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each layer's variant lets `?` convert
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum MurmurError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid room name).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A storage error outside of a room (opening a database).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A room-level error (activation, join, actor gone).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// An environment variable could not be parsed.
    #[error("invalid value for {var}: {reason}")]
    Config { var: &'static str, reason: String },
}
