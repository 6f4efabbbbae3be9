//! Error types for the room layer.

use murmur_protocol::{PeerId, RoomId};
use murmur_store::StoreError;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room is not registered with the manager.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The peer is already in this room.
    #[error("{0} already in room {1}")]
    AlreadyJoined(PeerId, RoomId),

    /// The peer is not in this room.
    #[error("{0} not in room {1}")]
    NotJoined(PeerId, RoomId),

    /// The room's actor has stopped.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),

    /// Opening, migrating or loading the room's store failed.
    #[error("room store failed: {0}")]
    Store(#[from] StoreError),
}
