//! # Murmur
//!
//! Real-time chat rooms over WebSockets.
//!
//! A client connects to `/parties/chat/<room>`, receives the room's full
//! history as one `all` envelope, and from then on sends `add` and
//! `update` envelopes. Every payload is relayed to the other peers in the
//! room as sent; valid ones are also applied to the room's history, which
//! lives in memory and is written through to a per-room SQLite table.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use murmur::prelude::*;
//!
//! # async fn start() -> Result<(), MurmurError> {
//! let server = MurmurServer::builder()
//!     .config(ServerConfig::from_env()?)
//!     .build()
//!     .await?;
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod routing;
mod server;

pub use config::{DEFAULT_BIND, DEFAULT_ROUTE_PREFIX, ServerConfig};
pub use error::MurmurError;
pub use routing::room_for_path;
pub use server::{MurmurServer, MurmurServerBuilder};

/// Convenience re-exports for building a server.
pub mod prelude {
    pub use crate::{MurmurError, MurmurServer, MurmurServerBuilder, ServerConfig};
    pub use murmur_protocol::{Envelope, Message, Role, RoomId};
    pub use murmur_room::RoomConfig;
    pub use murmur_store::StoreLocation;
}
