//! End-to-end tests: real WebSocket clients against a running server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use murmur::prelude::*;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// A server running in the background until `stop` is called.
struct TestServer {
    addr: String,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<(), MurmurError>>,
}

impl TestServer {
    async fn start(builder: MurmurServerBuilder) -> Self {
        let server = builder
            .bind("127.0.0.1:0")
            .build()
            .await
            .expect("server should build");
        let addr = server.local_addr().expect("should have local addr").to_string();

        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async move {
            let _ = signal.await;
        }));
        Self { addr, shutdown, task }
    }

    async fn connect(&self, path: &str) -> ClientWs {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}{path}", self.addr))
            .await
            .expect("should connect");
        ws
    }

    /// Connects to a room and takes the join snapshot off the stream.
    async fn join(&self, room: &str) -> (ClientWs, Vec<Value>) {
        let mut ws = self.connect(&format!("/parties/chat/{room}")).await;
        let snapshot = recv_json(&mut ws).await;
        assert_eq!(snapshot["type"], "all", "first frame must be the snapshot");
        let messages = snapshot["messages"].as_array().cloned().unwrap_or_default();
        (ws, messages)
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        self.task.await.unwrap().unwrap();
    }
}

async fn recv_text(ws: &mut ClientWs) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            WsMessage::Text(text) => return text.as_str().to_owned(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("expected text, got {other:?}"),
        }
    }
}

async fn recv_json(ws: &mut ClientWs) -> Value {
    serde_json::from_str(&recv_text(ws).await).expect("server sent invalid JSON")
}

async fn send_text(ws: &mut ClientWs, text: &str) {
    ws.send(WsMessage::Text(text.to_string().into())).await.expect("send");
}

async fn assert_silent(ws: &mut ClientWs) {
    let result = tokio::time::timeout(Duration::from_millis(150), ws.next()).await;
    assert!(result.is_err(), "expected no traffic, got {result:?}");
}

/// Waits until the server closes the connection.
async fn assert_closed(ws: &mut ClientWs) {
    let next = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("server should close the connection");
    match next {
        None | Some(Ok(WsMessage::Close(_))) | Some(Err(_)) => {}
        Some(Ok(other)) => panic!("expected close, got {other:?}"),
    }
}

fn add(id: &str, content: &str, user: &str) -> String {
    json!({"type": "add", "id": id, "content": content, "user": user, "role": "user"}).to_string()
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_chat_scenario() {
    let server = TestServer::start(MurmurServer::builder()).await;

    let (mut alice, history) = server.join("lobby").await;
    assert!(history.is_empty());
    let (mut bob, history) = server.join("lobby").await;
    assert!(history.is_empty());

    let hello = add("m1", "hello", "Alice");
    send_text(&mut alice, &hello).await;

    // Bob gets Alice's frame verbatim; Alice gets no echo.
    assert_eq!(recv_text(&mut bob).await, hello);
    assert_silent(&mut alice).await;

    let edit = json!({"type": "update", "id": "m1", "content": "hello, edited", "user": "Alice", "role": "user"})
        .to_string();
    send_text(&mut alice, &edit).await;
    assert_eq!(recv_text(&mut bob).await, edit);

    // A late joiner sees the edited message once, with a server timestamp.
    let (mut carol, history) = server.join("lobby").await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], "m1");
    assert_eq!(history[0]["content"], "hello, edited");
    assert_eq!(history[0]["role"], "user");
    assert!(history[0]["created_at"].is_string());

    let reply = json!({"type": "add", "id": "m2", "content": "hi all", "user": "Carol", "role": "assistant"})
        .to_string();
    send_text(&mut carol, &reply).await;
    assert_eq!(recv_text(&mut alice).await, reply);
    assert_eq!(recv_text(&mut bob).await, reply);

    server.stop().await;
}

#[tokio::test]
async fn test_snapshot_is_not_sent_to_existing_peers() {
    let server = TestServer::start(MurmurServer::builder()).await;
    let (mut alice, _) = server.join("lobby").await;

    let (_bob, _) = server.join("lobby").await;

    assert_silent(&mut alice).await;
    server.stop().await;
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let server = TestServer::start(MurmurServer::builder()).await;
    let (mut alice, _) = server.join("lobby").await;
    let (mut other, _) = server.join("elsewhere").await;

    send_text(&mut alice, &add("m1", "lobby only", "Alice")).await;

    assert_silent(&mut other).await;
    let (_late, history) = server.join("elsewhere").await;
    assert!(history.is_empty());
    server.stop().await;
}

#[tokio::test]
async fn test_malformed_frame_is_relayed_but_not_stored() {
    let server = TestServer::start(MurmurServer::builder()).await;
    let (mut alice, _) = server.join("lobby").await;
    let (mut bob, _) = server.join("lobby").await;

    send_text(&mut alice, "definitely not json").await;
    assert_eq!(recv_text(&mut bob).await, "definitely not json");

    let (_carol, history) = server.join("lobby").await;
    assert!(history.is_empty());
    server.stop().await;
}

#[tokio::test]
async fn test_validate_before_relay_drops_malformed_frame() {
    let config = RoomConfig {
        validate_before_relay: true,
        ..RoomConfig::default()
    };
    let server = TestServer::start(MurmurServer::builder().room_config(config)).await;
    let (mut alice, _) = server.join("lobby").await;
    let (mut bob, _) = server.join("lobby").await;

    send_text(&mut alice, "definitely not json").await;
    let valid = add("m1", "ok", "Alice");
    send_text(&mut alice, &valid).await;

    assert_eq!(recv_text(&mut bob).await, valid);
    server.stop().await;
}

#[tokio::test]
async fn test_unroutable_path_is_closed() {
    let server = TestServer::start(MurmurServer::builder()).await;

    let mut ws = server.connect("/somewhere/else").await;
    assert_closed(&mut ws).await;

    let mut ws = server.connect("/parties/chat/not%20a%20room").await;
    assert_closed(&mut ws).await;

    server.stop().await;
}

#[tokio::test]
async fn test_custom_route_prefix() {
    let server = TestServer::start(MurmurServer::builder().route_prefix("/rooms/")).await;

    let mut ws = server.connect("/rooms/general").await;
    assert_eq!(recv_json(&mut ws).await, json!({"type": "all", "messages": []}));

    let mut ws = server.connect("/parties/chat/general").await;
    assert_closed(&mut ws).await;

    server.stop().await;
}

#[tokio::test]
async fn test_disconnected_peer_leaves_room() {
    let server = TestServer::start(MurmurServer::builder()).await;
    let (mut alice, _) = server.join("lobby").await;
    let (bob, _) = server.join("lobby").await;

    drop(bob);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Relaying to a departed peer must not disturb the room.
    send_text(&mut alice, &add("m1", "still here", "Alice")).await;
    let (_carol, history) = server.join("lobby").await;
    assert_eq!(history.len(), 1);
    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_disconnects_peers() {
    let server = TestServer::start(MurmurServer::builder()).await;
    let (mut alice, _) = server.join("lobby").await;

    server.stop().await;

    assert_closed(&mut alice).await;
}

#[tokio::test]
async fn test_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let location = StoreLocation::Directory(dir.path().to_path_buf());

    let server = TestServer::start(MurmurServer::builder().store(location.clone())).await;
    let (mut alice, _) = server.join("lobby").await;
    send_text(&mut alice, &add("m1", "first", "Alice")).await;
    send_text(&mut alice, &add("m2", "second", "Alice")).await;
    // The join is handled after both writes, so the snapshot proves them.
    let (_bob, history) = server.join("lobby").await;
    assert_eq!(history.len(), 2);
    server.stop().await;

    assert!(dir.path().join("lobby.sqlite3").exists());

    let server = TestServer::start(MurmurServer::builder().store(location)).await;
    let (_carol, history) = server.join("lobby").await;
    let ids: Vec<&str> = history.iter().filter_map(|m| m["id"].as_str()).collect();
    assert_eq!(ids, ["m1", "m2"]);
    server.stop().await;
}

#[tokio::test]
async fn test_idle_socket_does_not_block_other_clients() {
    let server = TestServer::start(MurmurServer::builder()).await;

    // Opens TCP but never sends an upgrade request.
    let _idle = tokio::net::TcpStream::connect(server.addr.as_str()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let joined = tokio::time::timeout(Duration::from_secs(3), server.join("lobby")).await;
    let (mut alice, history) = joined.expect("a real client must get its snapshot");
    assert!(history.is_empty());

    let (mut bob, _) = server.join("lobby").await;
    send_text(&mut alice, &add("m1", "still serving", "Alice")).await;
    assert_eq!(recv_text(&mut bob).await, add("m1", "still serving", "Alice"));

    server.stop().await;
}

#[tokio::test]
async fn test_peer_that_stops_reading_is_disconnected() {
    let config = RoomConfig {
        peer_queue_size: 4,
        ..RoomConfig::default()
    };
    let server = TestServer::start(MurmurServer::builder().room_config(config)).await;
    let (mut alice, _) = server.join("lobby").await;
    let (mut bob, _) = server.join("lobby").await;

    // Bob reads nothing while Alice floods the room with more than the
    // socket buffers can hold.
    let big = "x".repeat(64 * 1024);
    for i in 0..512 {
        send_text(&mut alice, &add(&format!("m{i}"), &big, "Alice")).await;
    }

    // Drain what Bob was sent; the server must end the connection.
    let closed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match bob.next().await {
                None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "lagging peer should be disconnected");
    server.stop().await;
}
