//! Wire protocol for Murmur.
//!
//! This crate defines the "language" that chat clients and the server speak:
//!
//! - **Types** ([`Envelope`], [`Message`], [`Role`], [`RoomId`],
//!   [`PeerId`], [`Recipient`]): the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those structures
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while doing so.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw text frames) and rooms
//! (message history). It knows nothing about sockets or databases.
//!
//! ```text
//! Transport (text) → Protocol (Envelope) → Room (history + peers)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Envelope, MAX_ROOM_ID_LEN, Message, PeerId, Recipient, Role, RoomId,
};
