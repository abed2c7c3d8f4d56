//! The publish/subscribe client seam.
//!
//! [`ConnectionManager`](crate::manager::ConnectionManager) never talks to a
//! socket directly. It asks a [`ClientFactory`] for a [`PubSubClient`] and
//! reacts to the lifecycle events that client reports through a
//! [`LifecycleListener`]. [`StompClient`](crate::client::StompClient) is the
//! production implementation; tests substitute a recording mock.
//!
//! # Reentrancy contract
//!
//! Implementations must not invoke listener methods or frame callbacks from
//! inside [`PubSubClient::subscribe`], [`PubSubClient::publish`] or
//! [`Subscription::unsubscribe`], and must not hold internal locks while they
//! invoke them. The manager calls into the client while holding its own state
//! lock.

use std::sync::Arc;

use crate::client::ChatSocketConfig;
use crate::error::{ChatSocketError, Result};

/// Callback receiving the raw body of each frame on a subscription.
pub type FrameCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// A live subscription on the current session.
pub trait Subscription: Send + Sync {
    /// Transport-assigned subscription id.
    fn id(&self) -> &str;

    /// Destination this subscription listens on.
    fn destination(&self) -> &str;

    /// Stop receiving frames.
    ///
    /// # Errors
    ///
    /// Transport errors while sending the unsubscribe request.
    fn unsubscribe(&self) -> Result<()>;
}

/// Shared handle to a [`Subscription`].
pub type SubscriptionHandle = Arc<dyn Subscription>;

/// A publish/subscribe connection with automatic reconnect.
pub trait PubSubClient: Send + Sync {
    /// Begin connecting. Returns immediately.
    fn activate(&self);

    /// Stop the connection and the reconnect policy for good.
    fn deactivate(&self);

    /// Whether the session is currently established.
    fn is_connected(&self) -> bool;

    /// Subscribe `callback` to `destination` on the current session.
    ///
    /// # Errors
    ///
    /// [`ChatSocketError::NotConnected`] while no session is established.
    fn subscribe(&self, destination: &str, callback: FrameCallback) -> Result<SubscriptionHandle>;

    /// Publish `body` to `destination`. Fire-and-forget.
    ///
    /// # Errors
    ///
    /// [`ChatSocketError::NotConnected`] while no session is established.
    fn publish(&self, destination: &str, body: String) -> Result<()>;
}

/// Receives connection lifecycle events from a [`PubSubClient`].
///
/// All methods default to no-ops.
pub trait LifecycleListener: Send + Sync {
    /// A session was established (first connect or reconnect).
    fn on_connect(&self) {}

    /// A session ended or a connect attempt failed.
    fn on_close(&self, _reason: Option<&str>) {}

    /// The underlying transport failed.
    fn on_transport_error(&self, _error: &ChatSocketError) {}

    /// The broker reported an error frame.
    fn on_protocol_error(&self, _message: &str) {}
}

/// Builds [`PubSubClient`]s for the manager.
pub trait ClientFactory: Send + Sync {
    /// Create a client, not yet activated, that authenticates with
    /// `credential` and reports to `listener`.
    fn create(
        &self,
        config: &ChatSocketConfig,
        credential: &str,
        listener: Arc<dyn LifecycleListener>,
    ) -> Arc<dyn PubSubClient>;
}
