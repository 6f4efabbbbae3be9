//! `MurmurServer` builder and accept loop.
//!
//! Ties the layers together: transport → routing → room.

use std::future::Future;
use std::sync::Arc;

use murmur_protocol::JsonCodec;
use murmur_room::{RoomConfig, RoomManager};
use murmur_store::StoreLocation;
use murmur_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{MurmurError, ServerConfig};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) rooms: RoomManager,
    pub(crate) codec: JsonCodec,
    pub(crate) route_prefix: String,
    /// Capacity of each peer's outbound queue.
    pub(crate) peer_queue_size: usize,
}

/// Builder for configuring and starting a Murmur server.
///
/// # Example
///
/// ```rust,no_run
/// use murmur::prelude::*;
///
/// # async fn start() -> Result<(), MurmurError> {
/// let server = MurmurServer::builder()
///     .bind("0.0.0.0:1999")
///     .store(StoreLocation::Directory("data".into()))
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MurmurServerBuilder {
    config: ServerConfig,
}

impl MurmurServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a complete configuration, e.g. one read by
    /// [`ServerConfig::from_env`].
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to listen on. Port `0` picks a free port.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Sets the path prefix rooms are served under.
    pub fn route_prefix(mut self, prefix: &str) -> Self {
        self.config.route_prefix = prefix.to_string();
        self
    }

    /// Sets where room databases are kept.
    pub fn store(mut self, location: StoreLocation) -> Self {
        self.config.store = location;
        self
    }

    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.config.room = config;
        self
    }

    /// Binds the listener. Rooms are activated later, on first connect.
    pub async fn build(self) -> Result<MurmurServer, MurmurError> {
        let ServerConfig {
            bind,
            route_prefix,
            store,
            room,
        } = self.config;

        let transport = WebSocketTransport::bind(&bind).await?;
        tracing::info!(
            addr = ?transport.local_addr().ok(),
            %route_prefix,
            ?store,
            "murmur server bound"
        );

        let state = Arc::new(ServerState {
            peer_queue_size: room.peer_queue_size,
            rooms: RoomManager::new(store, room),
            codec: JsonCodec,
            route_prefix,
        });

        Ok(MurmurServer { transport, state })
    }
}

/// A bound Murmur server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct MurmurServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
}

impl MurmurServer {
    pub fn builder() -> MurmurServerBuilder {
        MurmurServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), MurmurError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes, then stops every
    /// room. Connected peers are disconnected once their room stops.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> Result<(), MurmurError> {
        tracing::info!("murmur server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(pending) => {
                        // The handshake runs in the connection's own task.
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(pending, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
                () = &mut shutdown => break,
            }
        }

        tracing::info!("shutting down");
        self.state.rooms.shutdown_all().await;
        Ok(())
    }
}
