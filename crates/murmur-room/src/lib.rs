//! Room actors for Murmur.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns the
//! room's message history, its store, and the outbound channels of its
//! connected peers. Every operation on a room is a command on the actor's
//! channel, so nothing about a room is ever touched concurrently.
//!
//! Each peer's outbound queue is bounded by
//! [`RoomConfig::peer_queue_size`]; a peer that stops reading is dropped
//! from its room when the queue fills.
//!
//! # Key types
//!
//! - [`RoomManager`] - activates rooms on first access and tracks them
//! - [`RoomHandle`] - send commands to a running room actor
//! - [`MessageLog`] - the in-memory history, ordered and keyed by id
//! - [`RoomConfig`] - per-room settings

mod config;
mod error;
mod history;
mod manager;
mod room;

pub use config::RoomConfig;
pub use error::RoomError;
pub use history::{MessageLog, Upserted};
pub use manager::RoomManager;
pub use room::{PeerSender, RoomHandle, RoomInfo, RoomOutbound, spawn_room};
