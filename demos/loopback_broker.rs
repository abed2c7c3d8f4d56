//! # Loopback Broker Example
//!
//! Shows how to plug a custom [`Connector`] into the manager. The connector
//! here hands the client an in-process channel pair and spawns a toy STOMP
//! broker on the other end that:
//!
//! - answers `CONNECT` with `CONNECTED`,
//! - echoes every chat send back to the room's subscribers, stamped with a
//!   message id,
//! - answers `/app/ping` with a pong on `/user/queue/ping`.
//!
//! Useful for trying UI code without a backend, or as a template for a
//! transport over something other than WebSocket.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_broker
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_socket_client::protocol::{
    parse_frames, ChatMessage, Command, Frame, SendMessageRequest, CHAT_SEND_DESTINATION,
    PING_DESTINATION, PING_SEND_DESTINATION,
};
use chat_socket_client::transport::Connector;
use chat_socket_client::{
    ChatSocketConfig, ChatSocketError, ConnectionManager, Handler, StompClientFactory, Transport,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-backed transport
// ─────────────────────────────────────────────────────────────────────

struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), ChatSocketError> {
        self.tx
            .send(message)
            .map_err(|e| ChatSocketError::TransportSend(e.to_string()))
    }

    /// Cancel-safe because `mpsc::UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, ChatSocketError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ChatSocketError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A connector that starts a broker per connection
// ─────────────────────────────────────────────────────────────────────

struct LoopbackConnector;

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ChatSocketError> {
        tracing::info!("Loopback connect to {url}");
        let (client_tx, broker_rx) = mpsc::unbounded_channel();
        let (broker_tx, client_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_broker(broker_rx, broker_tx));
        Ok(Box::new(LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        }))
    }
}

/// The toy broker: one task per connection.
async fn run_broker(
    mut from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
) {
    // subscription id -> destination
    let mut subscriptions: HashMap<String, String> = HashMap::new();
    let mut next_message_id = 1_i64;

    let deliver = |subscriptions: &HashMap<String, String>, destination: &str, body: &str| {
        for (id, dest) in subscriptions {
            if dest == destination {
                let frame = Frame::new(Command::Message)
                    .with_header("subscription", id.as_str())
                    .with_header("destination", destination)
                    .with_body(body);
                let _ = to_client.send(frame.encode());
            }
        }
    };

    while let Some(text) = from_client.recv().await {
        let Ok(frames) = parse_frames(&text) else {
            tracing::warn!("Broker: dropping malformed frame");
            continue;
        };
        for frame in frames {
            match frame.command {
                Command::Connect => {
                    let reply = Frame::new(Command::Connected).with_header("version", "1.2");
                    let _ = to_client.send(reply.encode());
                }
                Command::Subscribe => {
                    if let (Some(id), Some(dest)) = (frame.header("id"), frame.header("destination")) {
                        subscriptions.insert(id.to_string(), dest.to_string());
                    }
                }
                Command::Unsubscribe => {
                    if let Some(id) = frame.header("id") {
                        subscriptions.remove(id);
                    }
                }
                Command::Send => match frame.header("destination") {
                    Some(PING_SEND_DESTINATION) => deliver(&subscriptions, PING_DESTINATION, "pong"),
                    Some(CHAT_SEND_DESTINATION) => {
                        let Ok(request) = serde_json::from_str::<SendMessageRequest>(&frame.body) else {
                            continue;
                        };
                        let echo = ChatMessage {
                            message_id: next_message_id,
                            room_id: request.room_id,
                            sender_id: 1,
                            content: request.content,
                            created_at: None,
                            attachments: Vec::new(),
                        };
                        next_message_id += 1;
                        if let Ok(body) = serde_json::to_string(&echo) {
                            let destination = format!("/topic/room/{}", request.room_id);
                            deliver(&subscriptions, &destination, &body);
                        }
                    }
                    other => tracing::info!("Broker: ignoring send to {other:?}"),
                },
                Command::Disconnect => return,
                other => tracing::debug!("Broker: ignoring {other}"),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Wire the manager to the loopback connector
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let factory = Arc::new(StompClientFactory::new(Arc::new(LoopbackConnector)));
    let manager = ConnectionManager::new(ChatSocketConfig::new("loopback://broker"), factory);

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();
    manager.subscribe_room(
        7,
        Handler::from_fn(move |payload| {
            if let Some(msg) = payload.parse::<ChatMessage>() {
                let _ = seen_tx.send(msg.content);
            }
        }),
    );
    let on_ping = Handler::from_fn(|payload| tracing::info!("Ping answered: {payload:?}"));

    manager.ensure_connected("loopback-token", Some(on_ping)).await?;
    tracing::info!("Live topics: {:?}", manager.live_topics());

    for text in ["first", "second", "third"] {
        if !manager.send_message(7, text) {
            return Err("send rejected".into());
        }
    }

    for _ in 0..3 {
        match tokio::time::timeout(Duration::from_secs(1), seen_rx.recv()).await {
            Ok(Some(content)) => tracing::info!("Room 7 echoed: {content}"),
            _ => return Err("echo did not arrive".into()),
        }
    }

    manager.disconnect();
    tracing::info!("Done. Custom connector works!");
    Ok(())
}
