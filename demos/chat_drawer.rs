//! # Chat Drawer Example
//!
//! Drives a chat drawer the way a UI would:
//!
//! 1. Connect to the broker with a JWT and wait until the session is up
//! 2. Follow the personal room-list feed
//! 3. Open one room: messages and read receipts
//! 4. Send a greeting
//! 5. Close the room and disconnect on Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! # Start the chat backend on localhost:8080, then:
//! CHAT_TOKEN=<jwt> cargo run --example chat_drawer
//!
//! # Override the endpoint or room:
//! CHAT_SOCKET_URL=ws://chat:8080/ws-chat/websocket CHAT_ROOM=12 \
//!     CHAT_TOKEN=<jwt> cargo run --example chat_drawer
//! ```

use chat_socket_client::{
    ChatMessage, ChatSocketConfig, ConnectionManager, Handler, ReadEvent, RoomsEvent,
};

/// Room opened when `CHAT_ROOM` is not set.
const DEFAULT_ROOM: i64 = 1;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=chat_socket_client=debug` for frame-level detail.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let config = match std::env::var("CHAT_SOCKET_URL") {
        Ok(url) => ChatSocketConfig::new(url),
        Err(_) => ChatSocketConfig::default(),
    };
    let token = std::env::var("CHAT_TOKEN").map_err(|_| "CHAT_TOKEN is not set")?;
    let room: i64 = match std::env::var("CHAT_ROOM") {
        Ok(raw) => raw.parse()?,
        Err(_) => DEFAULT_ROOM,
    };
    tracing::info!("Connecting to {}", config.url);

    let manager = ConnectionManager::websocket(config);

    // ── Subscriptions ───────────────────────────────────────────────
    // Registered before the connection exists; they go live on connect and
    // come back by themselves after every reconnect.
    manager.subscribe_rooms(Handler::from_fn(|payload| {
        if let Some(event) = payload.parse::<RoomsEvent>() {
            tracing::info!("Room list changed ({}), refreshing", event.kind);
        }
    }));

    let on_message = Handler::from_fn(|payload| match payload.parse::<ChatMessage>() {
        Some(msg) => tracing::info!("[room {}] {}: {}", msg.room_id, msg.sender_id, msg.content),
        None => tracing::warn!("Unexpected message payload: {payload:?}"),
    });
    let on_read = Handler::from_fn(|payload| {
        if let Some(read) = payload.parse::<ReadEvent>() {
            tracing::info!(
                "[room {}] user {} read up to {:?}",
                read.room_id,
                read.user_id,
                read.last_read_message_id
            );
        }
    });
    manager.subscribe_room(room, on_message.clone());
    manager.subscribe_room_read(room, on_read.clone());

    let on_ping = Handler::from_fn(|_| tracing::debug!("pong"));

    // ── Connect ─────────────────────────────────────────────────────
    manager.ensure_connected(&token, Some(on_ping)).await?;
    tracing::info!("Connected; live topics: {:?}", manager.live_topics());

    if !manager.send_message(room, "hello from the drawer") {
        tracing::warn!("Greeting was not sent");
    }

    // ── Wait for Ctrl+C ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received, closing room {room}");

    manager.unsubscribe_room(room, Some(&on_message));
    manager.unsubscribe_room_read(room, Some(&on_read));
    manager.disconnect();

    // Give the session loop a moment to send DISCONNECT.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    tracing::info!("Done");
    Ok(())
}
