//! Per-connection handler: routing, joining a room, and shuttling traffic.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Complete the WebSocket handshake
//!   2. Route the request path to a room, or close the connection
//!   3. Activate the room if needed and join it
//!   4. Loop: inbound frames go to the room, room traffic goes out

use std::sync::Arc;

use murmur_protocol::{Codec, Envelope, PeerId};
use murmur_room::{RoomHandle, RoomOutbound};
use murmur_transport::{Connection, Handshake, PendingWebSocket, WebSocketConnection};
use tokio::sync::mpsc;

use crate::routing::room_for_path;
use crate::server::ServerState;
use crate::MurmurError;

/// Drop guard that removes a peer from its room when the handler exits.
///
/// `Drop` is synchronous, so the leave is sent from a spawned task.
struct PeerGuard {
    peer: PeerId,
    room: RoomHandle,
}

impl Drop for PeerGuard {
    fn drop(&mut self) {
        let peer = self.peer;
        let room = self.room.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                // The room may already be gone on shutdown.
                let _ = room.leave(peer).await;
            });
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    pending: PendingWebSocket,
    state: Arc<ServerState>,
) -> Result<(), MurmurError> {
    let addr = pending.peer_addr();
    let conn = pending.upgrade().await.inspect_err(|e| {
        tracing::debug!(%addr, error = %e, "handshake failed");
    })?;
    let conn_id = conn.id();
    let peer = PeerId(conn_id.into_inner());

    let Some(room_id) = room_for_path(&state.route_prefix, conn.path()) else {
        tracing::info!(%conn_id, path = conn.path(), "no room at path, closing");
        conn.close().await?;
        return Ok(());
    };

    let activated = state.rooms.get_or_activate(&room_id).await;
    let room = match activated {
        Ok(room) => room,
        Err(e) => {
            let _ = conn.close().await;
            return Err(e.into());
        }
    };

    let (tx, mut outbound) = mpsc::channel(state.peer_queue_size.max(1));
    room.join(peer, tx).await?;
    let _guard = PeerGuard {
        peer,
        room: room.clone(),
    };
    tracing::debug!(%conn_id, %peer, %room_id, addr = %conn.peer_addr(), "connection joined room");

    loop {
        tokio::select! {
            inbound = conn.recv() => match inbound {
                Ok(Some(text)) => room.relay(peer, text).await?,
                Ok(None) => {
                    tracing::debug!(%peer, %room_id, "connection closed by client");
                    break;
                }
                Err(e) => {
                    tracing::debug!(%peer, %room_id, error = %e, "recv error");
                    break;
                }
            },
            out = outbound.recv() => match out {
                Some(msg) => send_outbound(&conn, &state, msg).await?,
                None => {
                    // The room stopped or dropped this peer for lagging.
                    tracing::debug!(%peer, %room_id, "room closed the queue, closing connection");
                    let _ = conn.close().await;
                    break;
                }
            },
        }
    }

    // _guard drops here → the peer leaves the room.
    Ok(())
}

/// Writes one piece of room traffic to the socket.
///
/// A snapshot is encoded as an `all` envelope; relayed payloads go out
/// exactly as the sending peer wrote them.
async fn send_outbound(
    conn: &WebSocketConnection,
    state: &ServerState,
    msg: RoomOutbound,
) -> Result<(), MurmurError> {
    match msg {
        RoomOutbound::Snapshot(messages) => {
            let text = state.codec.encode(&Envelope::All { messages })?;
            conn.send(&text).await?;
        }
        RoomOutbound::Relay(payload) => {
            conn.send(&payload).await?;
        }
    }
    Ok(())
}
