//! Transport implementations for the chat socket client.
//!
//! This module provides concrete [`Transport`](crate::Transport) and
//! [`Connector`](crate::transport::Connector) implementations behind feature
//! gates:
//!
//! | Feature                | Transport              | Connector              |
//! |------------------------|------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] | [`WebSocketConnector`] |

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
