//! Transport abstraction for the chat socket client.
//!
//! The [`Transport`] trait defines a bidirectional text message channel between
//! the client and the broker. STOMP frames are text, so every transport
//! implementation must handle message framing internally (WebSocket frames,
//! length-prefixed TCP, in-process channels for tests).
//!
//! # Connection Setup
//!
//! Unlike a one-shot client, the STOMP session loop re-establishes the
//! connection on its own after every drop, so it needs a way to build a fresh
//! transport on demand. That is the job of [`Connector`].
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use chat_socket_client::error::ChatSocketError;
//! use chat_socket_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), ChatSocketError> {
//!         // Send one encoded STOMP frame
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, ChatSocketError>> {
//!         // Receive the next text message; None when closed cleanly
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ChatSocketError> {
//!         unimplemented!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ChatSocketError> {
//!         Ok(Box::new(MyTransport {}))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ChatSocketError;

/// A bidirectional text message transport carrying STOMP frames.
///
/// Each call to [`send`](Transport::send) transmits one complete message.
/// Each call to [`recv`](Transport::recv) returns one complete message, which
/// may hold one or more NUL-terminated frames or a bare heart-beat.
///
/// # Object Safety
///
/// This trait is object-safe; the session loop drives `Box<dyn Transport>`
/// values produced by a [`Connector`].
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is used
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling it
/// again must not lose data. Channel-based implementations (e.g., wrapping
/// `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a text message to the broker.
    ///
    /// # Errors
    ///
    /// Returns [`ChatSocketError::TransportSend`] if the message could not be sent
    /// (e.g., connection broken, write buffer full).
    async fn send(&mut self, message: String) -> Result<(), ChatSocketError>;

    /// Receive the next text message from the broker.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete message was received
    /// - `Some(Err(e))` — a transport error occurred (e.g., [`ChatSocketError::TransportReceive`])
    /// - `None` — the connection was closed cleanly by the broker
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, ChatSocketError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), ChatSocketError>;
}

/// Builds a connected [`Transport`] for a URL.
///
/// Called once per session by [`StompClient`](crate::client::StompClient):
/// on activation and again after every reconnect delay.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatSocketError::Io`] (or another transport error) when the
    /// endpoint cannot be reached.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ChatSocketError>;
}
