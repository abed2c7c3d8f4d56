//! Error types for the chat socket client.

use thiserror::Error;

/// Errors that can occur when using the chat socket client.
///
/// Most of these never escape [`ConnectionManager`](crate::manager::ConnectionManager):
/// transport and protocol failures are logged and recovered by the reconnect
/// policy. Only [`ConnectTimeout`](ChatSocketError::ConnectTimeout) and
/// [`AuthRequired`](ChatSocketError::AuthRequired) are surfaced by
/// `ensure_connected`.
#[derive(Debug, Error)]
pub enum ChatSocketError {
    /// A connect was attempted without a bearer credential.
    #[error("authentication credential is required")]
    AuthRequired,

    /// The connection did not become ready within the configured bound.
    #[error("connect timed out")]
    ConnectTimeout,

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// The broker answered with an `ERROR` frame.
    #[error("protocol error: {message}")]
    Protocol {
        /// The `message` header of the `ERROR` frame, or its body.
        message: String,
    },

    /// A transport message could not be parsed as a STOMP frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Failed to serialize or deserialize a JSON payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A caller-supplied handler failed while processing a frame.
    #[error("handler error: {0}")]
    Handler(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for chat socket operations.
pub type Result<T> = std::result::Result<T, ChatSocketError>;
