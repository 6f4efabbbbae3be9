//! Runnable Murmur chat server.
//!
//! Configured from the environment (a `.env` file is read if present):
//!
//! ```text
//! MURMUR_BIND=0.0.0.0:1999
//! MURMUR_DATA_DIR=./data            # unset keeps every room in memory
//! MURMUR_ROUTE_PREFIX=/parties/chat/
//! MURMUR_VALIDATE_BEFORE_RELAY=false
//! MURMUR_PEER_QUEUE_SIZE=256
//! RUST_LOG=info,murmur_room=debug
//! ```

use murmur::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("ctrl-c received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server = MurmurServer::builder().config(config).build().await?;
    tracing::info!(
        addr = %server.local_addr()?,
        "chat server listening, connect to ws://<addr>/parties/chat/<room>"
    );

    server.run_until(shutdown_signal()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    type Ws = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn start() -> String {
        let server = MurmurServer::builder()
            .bind("127.0.0.1:0")
            .build()
            .await
            .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(server.run());
        addr
    }

    async fn ws(addr: &str, room: &str) -> Ws {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/parties/chat/{room}"))
            .await
            .unwrap();
        ws
    }

    async fn next_json(ws: &mut Ws) -> serde_json::Value {
        match ws.next().await.unwrap().unwrap() {
            WsMessage::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_two_clients_chat() {
        let addr = start().await;
        let mut a = ws(&addr, "demo").await;
        let mut b = ws(&addr, "demo").await;
        assert_eq!(next_json(&mut a).await["type"], "all");
        assert_eq!(next_json(&mut b).await["type"], "all");

        let hi = r#"{"type":"add","id":"1","content":"hi","user":"a","role":"user"}"#;
        a.send(WsMessage::Text(hi.to_string().into())).await.unwrap();

        let got = next_json(&mut b).await;
        assert_eq!(got["content"], "hi");

        let mut c = ws(&addr, "demo").await;
        let snapshot = next_json(&mut c).await;
        assert_eq!(snapshot["messages"][0]["id"], "1");
    }
}
