//! # Chat Socket Client
//!
//! Real-time transport layer for a chat front-end: one authenticated STOMP
//! connection multiplexed across the personal room-list feed, per-room
//! messages, per-room read receipts and a liveness ping.
//!
//! ## Features
//!
//! - **Deferred subscriptions** — subscribe before the connection exists;
//!   the request is honored on connect
//! - **Reconnect recovery** — every reconnect re-establishes requested topics,
//!   never twice for the same key
//! - **Handler isolation** — a failing handler never blocks its siblings
//! - **Transport-agnostic** — implement [`Transport`] and
//!   [`Connector`](transport::Connector), or swap the whole client through
//!   [`ClientFactory`]
//! - **WebSocket built-in** — default `transport-websocket` feature provides
//!   `WebSocketTransport`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chat_socket_client::{ChatSocketConfig, ConnectionManager, Handler};
//!
//! let manager = ConnectionManager::websocket(ChatSocketConfig::default());
//! manager.ensure_connected(&jwt, None).await?;
//! manager.subscribe_rooms(Handler::from_fn(|_| refresh_room_list()));
//! let _ = manager.send_message(42, "hello");
//! ```

pub mod client;
pub mod error;
pub mod handler;
pub mod manager;
pub mod protocol;
pub mod pubsub;
pub mod registry;
pub mod topic;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{ChatSocketConfig, StompClient, StompClientFactory};
pub use error::ChatSocketError;
pub use handler::{Handler, HandlerError, HandlerResult, Payload};
pub use manager::ConnectionManager;
pub use protocol::{ChatMessage, ReadEvent, RoomsEvent};
pub use pubsub::{ClientFactory, LifecycleListener, PubSubClient, Subscription, SubscriptionHandle};
pub use topic::{RoomId, Topic};
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
