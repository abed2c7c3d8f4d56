//! Connection and subscription lifecycle for the chat UI.
//!
//! [`ConnectionManager`] multiplexes one authenticated [`PubSubClient`] across
//! four topic families: the personal room-list feed, per-room messages,
//! per-room read receipts and the liveness ping.
//!
//! Callers may subscribe before the connection exists. Their handlers and
//! requests are recorded in a [`Registry`] and turned into live subscriptions
//! by the reconcile pass that runs on every connect event. A transport drop
//! clears only the live subscriptions; the next reconnect restores them. Only
//! [`ConnectionManager::disconnect`] forgets what callers asked for.
//!
//! # Example
//!
//! ```rust,ignore
//! let manager = ConnectionManager::websocket(ChatSocketConfig::default());
//! manager.connect(&jwt, None);
//!
//! let on_message = Handler::from_fn(|payload| {
//!     if let Some(msg) = payload.parse::<ChatMessage>() {
//!         println!("{}: {}", msg.sender_id, msg.content);
//!     }
//! });
//! manager.subscribe_room(42, on_message.clone());
//! manager.send_message(42, "hello");
//! manager.unsubscribe_room(42, Some(&on_message));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::client::{lock, ChatSocketConfig};
use crate::error::{ChatSocketError, Result};
use crate::handler::{dispatch, Handler, Payload};
use crate::protocol::{
    LeaveRoomRequest, SendMessageRequest, CHAT_LEAVE_DESTINATION, CHAT_SEND_DESTINATION,
    PING_SEND_DESTINATION,
};
use crate::pubsub::{ClientFactory, FrameCallback, LifecycleListener, PubSubClient, SubscriptionHandle};
use crate::registry::Registry;
use crate::topic::{RoomId, Topic};

/// Resolves to `true` once connected, `false` on timeout.
type SharedWait = Shared<BoxFuture<'static, bool>>;

/// An `ensure_connected` wait that later callers may join until `deadline`.
struct PendingWait {
    id: u64,
    deadline: Instant,
    wait: SharedWait,
}

// ── State ───────────────────────────────────────────────────────────

struct State {
    client: Option<Arc<dyn PubSubClient>>,
    /// Identifies `client`; lifecycle events from older clients are ignored.
    generation: u64,
    /// A connect attempt is in flight.
    connecting: bool,
    registry: Registry<SubscriptionHandle>,
}

struct Inner {
    config: ChatSocketConfig,
    factory: Arc<dyn ClientFactory>,
    state: Mutex<State>,
    pending: Mutex<Option<PendingWait>>,
    next_wait: AtomicU64,
}

impl Inner {
    fn current_client(&self) -> Option<Arc<dyn PubSubClient>> {
        lock(&self.state).client.clone()
    }

    fn is_connected(&self) -> bool {
        lock(&self.state)
            .client
            .as_ref()
            .is_some_and(|c| c.is_connected())
    }
}

/// Subscribe `topic` on `client` and record the live handle.
///
/// Frames are routed back through `weak` so the transport never keeps the
/// manager alive. Failures are logged; the topic stays requested and the next
/// reconcile retries it.
fn subscribe_topic(
    weak: &Weak<Inner>,
    state: &mut State,
    client: &Arc<dyn PubSubClient>,
    topic: &Topic,
) -> Option<SubscriptionHandle> {
    if let Some(existing) = state.registry.live(topic) {
        return Some(Arc::clone(existing));
    }
    let destination = topic.destination();
    let route = weak.clone();
    let key = topic.clone();
    let callback: FrameCallback = Arc::new(move |body: &str| {
        if let Some(inner) = route.upgrade() {
            deliver(&inner, &key, body);
        }
    });
    match client.subscribe(&destination, callback) {
        Ok(handle) => {
            info!(topic = %topic, destination = %destination, "subscribed");
            state.registry.set_live(topic, Arc::clone(&handle));
            Some(handle)
        }
        Err(e) => {
            warn!(topic = %topic, "subscribe failed: {e}");
            None
        }
    }
}

/// Decode a frame body and hand it to every handler registered for `topic`.
fn deliver(inner: &Inner, topic: &Topic, body: &str) {
    let payload = Payload::decode(body);
    // Snapshot so handlers may (un)subscribe without deadlocking.
    let handlers = lock(&inner.state).registry.handlers(topic);
    if handlers.is_empty() {
        debug!(topic = %topic, "frame with no handlers");
        return;
    }
    dispatch(&topic.key(), &handlers, &payload);
}

fn teardown(topic: &Topic, handle: &SubscriptionHandle) {
    if let Err(e) = handle.unsubscribe() {
        warn!(topic = %topic, "unsubscribe failed: {e}");
    }
}

/// Unsubscribe every live handle. Handlers and requests are kept.
fn cleanup_live(state: &mut State) {
    for (topic, handle) in state.registry.take_live() {
        teardown(&topic, &handle);
    }
}

/// The reconcile pass: subscribe whatever is requested but not live.
fn resubscribe_all(weak: &Weak<Inner>, state: &mut State) {
    let Some(client) = state.client.clone() else {
        return;
    };
    if !client.is_connected() {
        return;
    }
    for topic in state.registry.reconcile() {
        let subscribed = subscribe_topic(weak, state, &client, &topic).is_some();
        if subscribed && topic == Topic::Ping {
            if let Err(e) = client.publish(PING_SEND_DESTINATION, String::new()) {
                debug!("initial ping not sent: {e}");
            }
        }
    }
}

// ── Lifecycle listener ──────────────────────────────────────────────

/// Routes one client's lifecycle events into the manager.
struct SessionListener {
    inner: Weak<Inner>,
    generation: u64,
}

impl SessionListener {
    fn with_state(&self, f: impl FnOnce(&Weak<Inner>, &mut State)) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut state = lock(&inner.state);
        if state.generation != self.generation || state.client.is_none() {
            debug!(generation = self.generation, "event from a retired client");
            return;
        }
        f(&self.inner, &mut state);
    }
}

impl LifecycleListener for SessionListener {
    fn on_connect(&self) {
        self.with_state(|weak, state| {
            state.connecting = false;
            info!("chat socket connected");
            resubscribe_all(weak, state);
        });
    }

    fn on_close(&self, reason: Option<&str>) {
        self.with_state(|_, state| {
            state.connecting = false;
            warn!(reason, "chat socket closed");
            cleanup_live(state);
        });
    }

    fn on_transport_error(&self, error: &ChatSocketError) {
        error!("chat socket transport error: {error}");
    }

    fn on_protocol_error(&self, message: &str) {
        error!("chat socket protocol error: {message}");
    }
}

// ── Manager ─────────────────────────────────────────────────────────

/// Owns the chat connection and every topic subscription.
///
/// Cheap to clone; clones share state. Construct one per application session.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a manager that builds clients with `factory`.
    pub fn new(config: ChatSocketConfig, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                factory,
                state: Mutex::new(State {
                    client: None,
                    generation: 0,
                    connecting: false,
                    registry: Registry::new(),
                }),
                pending: Mutex::new(None),
                next_wait: AtomicU64::new(0),
            }),
        }
    }

    /// Create a manager using STOMP over WebSocket.
    #[cfg(feature = "transport-websocket")]
    pub fn websocket(config: ChatSocketConfig) -> Self {
        Self::new(config, Arc::new(crate::client::StompClientFactory::websocket()))
    }

    pub fn config(&self) -> &ChatSocketConfig {
        &self.inner.config
    }

    // ── connect / ensure_connected / disconnect ─────────────────────

    /// Start connecting with `credential`, or return the existing client.
    ///
    /// Returns `None` without connecting when `credential` is empty. While a
    /// client is connected or still activating, that same client is returned
    /// and no second one is created. `on_ping` receives every liveness pong;
    /// it is only taken from the call that creates the client.
    pub fn connect(&self, credential: &str, on_ping: Option<Handler>) -> Option<Arc<dyn PubSubClient>> {
        if credential.trim().is_empty() {
            warn!("connect skipped: {}", ChatSocketError::AuthRequired);
            return None;
        }

        let (client, retired) = {
            let mut state = lock(&self.inner.state);
            if let Some(existing) = &state.client {
                if existing.is_connected() || state.connecting {
                    return Some(Arc::clone(existing));
                }
            }

            // A client that dropped and is waiting to retry is replaced so the
            // fresh credential is used.
            let retired = state.client.take();
            if retired.is_some() {
                cleanup_live(&mut state);
            }

            state.generation += 1;
            state.connecting = true;
            if let Some(handler) = on_ping {
                state.registry.request(&Topic::Ping, handler);
            }
            let listener = Arc::new(SessionListener {
                inner: Arc::downgrade(&self.inner),
                generation: state.generation,
            });
            let client = self
                .inner
                .factory
                .create(&self.inner.config, credential, listener);
            state.client = Some(Arc::clone(&client));
            debug!(generation = state.generation, "chat socket client created");
            (client, retired)
        };

        if let Some(old) = retired {
            old.deactivate();
        }
        client.activate();
        Some(client)
    }

    /// Connect if needed and wait until the connection is ready.
    ///
    /// Concurrent callers share one wait. The wait polls every
    /// `poll_interval` for at most `connect_timeout`.
    ///
    /// # Errors
    ///
    /// [`ChatSocketError::AuthRequired`] for an empty credential,
    /// [`ChatSocketError::ConnectTimeout`] when the bound elapses.
    pub async fn ensure_connected(
        &self,
        credential: &str,
        on_ping: Option<Handler>,
    ) -> Result<Arc<dyn PubSubClient>> {
        if credential.trim().is_empty() {
            return Err(ChatSocketError::AuthRequired);
        }
        if let Some(client) = self.connected_client() {
            return Ok(client);
        }

        let (id, wait) = {
            let mut pending = lock(&self.inner.pending);
            // A wait whose callers were all cancelled is never cleared by
            // them; once past its deadline it must not be joined.
            let now = Instant::now();
            match pending.as_ref().filter(|p| p.deadline > now) {
                Some(p) => (p.id, p.wait.clone()),
                None => {
                    self.connect(credential, on_ping);
                    let id = self.inner.next_wait.fetch_add(1, Ordering::Relaxed);
                    let deadline = now + self.inner.config.connect_timeout;
                    let wait = self.wait_for_connect(deadline).boxed().shared();
                    *pending = Some(PendingWait {
                        id,
                        deadline,
                        wait: wait.clone(),
                    });
                    (id, wait)
                }
            }
        };

        let connected = wait.await;
        {
            let mut pending = lock(&self.inner.pending);
            if pending.as_ref().is_some_and(|p| p.id == id) {
                *pending = None;
            }
        }

        if connected {
            if let Some(client) = self.connected_client() {
                return Ok(client);
            }
        }
        warn!(timeout = ?self.inner.config.connect_timeout, "ensure_connected timed out");
        Err(ChatSocketError::ConnectTimeout)
    }

    fn wait_for_connect(
        &self,
        deadline: Instant,
    ) -> impl std::future::Future<Output = bool> + Send + 'static {
        let inner = Arc::downgrade(&self.inner);
        let interval = self.inner.config.poll_interval;
        async move {
            loop {
                match inner.upgrade() {
                    Some(inner) if inner.is_connected() => return true,
                    Some(_) => {}
                    None => return false,
                }
                if Instant::now() >= deadline {
                    return false;
                }
                tokio::time::sleep(interval).await;
            }
        }
    }

    /// Tear everything down: live subscriptions, every handler and request,
    /// the pending wait and the client itself.
    pub fn disconnect(&self) {
        let client = {
            let mut state = lock(&self.inner.state);
            cleanup_live(&mut state);
            state.registry.clear();
            state.connecting = false;
            state.generation += 1;
            state.client.take()
        };
        lock(&self.inner.pending).take();

        if let Some(client) = client {
            info!("chat socket disconnected");
            client.deactivate();
        }
    }

    // ── Rooms feed ──────────────────────────────────────────────────

    /// Listen to the personal room-list feed.
    ///
    /// Returns the live handle, or `None` if queued until connect.
    pub fn subscribe_rooms(&self, handler: Handler) -> Option<SubscriptionHandle> {
        self.subscribe(Topic::Rooms, handler)
    }

    /// Drop the room-list subscription, all of its handlers and the request.
    pub fn unsubscribe_rooms(&self) {
        self.forget(&Topic::Rooms);
    }

    // ── Room messages ───────────────────────────────────────────────

    /// Listen to messages in `room_id`.
    ///
    /// Returns the live handle, or `None` if queued until connect. Repeated
    /// calls while live return the same handle.
    pub fn subscribe_room(&self, room_id: impl Into<RoomId>, handler: Handler) -> Option<SubscriptionHandle> {
        self.subscribe(Topic::Room(room_id.into()), handler)
    }

    /// Remove `handler` from `room_id`, or every handler when `None`.
    ///
    /// When the room is left without handlers the request is dropped and the
    /// live subscription torn down.
    pub fn unsubscribe_room(&self, room_id: impl Into<RoomId>, handler: Option<&Handler>) {
        self.unsubscribe(Topic::Room(room_id.into()), handler);
    }

    // ── Room read receipts ──────────────────────────────────────────

    /// Listen to read receipts in `room_id`. Same semantics as
    /// [`subscribe_room`](Self::subscribe_room).
    pub fn subscribe_room_read(
        &self,
        room_id: impl Into<RoomId>,
        handler: Handler,
    ) -> Option<SubscriptionHandle> {
        self.subscribe(Topic::RoomRead(room_id.into()), handler)
    }

    /// Same semantics as [`unsubscribe_room`](Self::unsubscribe_room).
    pub fn unsubscribe_room_read(&self, room_id: impl Into<RoomId>, handler: Option<&Handler>) {
        self.unsubscribe(Topic::RoomRead(room_id.into()), handler);
    }

    // ── Send ────────────────────────────────────────────────────────

    /// Publish a chat message to `room_id`.
    ///
    /// Returns `false` without publishing when disconnected, when the trimmed
    /// text is empty or when the room id is not numeric. Delivery is
    /// confirmed, if at all, by a frame on the room's message topic.
    #[must_use = "false means the message was not sent"]
    pub fn send_message(&self, room_id: impl Into<RoomId>, text: &str) -> bool {
        let room_id = room_id.into();
        let content = text.trim();
        if content.is_empty() {
            debug!(room_id = %room_id, "send rejected: empty message");
            return false;
        }
        let Some(numeric) = room_id.as_number() else {
            warn!(room_id = %room_id, "send rejected: room id is not numeric");
            return false;
        };
        self.publish_json(
            CHAT_SEND_DESTINATION,
            &SendMessageRequest {
                room_id: numeric,
                content: content.to_string(),
            },
        )
    }

    /// Ask the backend to remove the current user from `room_id`.
    ///
    /// Same fail-fast rules as [`send_message`](Self::send_message).
    #[must_use = "false means the request was not sent"]
    pub fn leave_room(&self, room_id: impl Into<RoomId>) -> bool {
        let room_id = room_id.into();
        let Some(numeric) = room_id.as_number() else {
            warn!(room_id = %room_id, "leave rejected: room id is not numeric");
            return false;
        };
        self.publish_json(CHAT_LEAVE_DESTINATION, &LeaveRoomRequest { room_id: numeric })
    }

    /// Send a liveness ping; the pong arrives on the ping handler.
    #[must_use = "false means the ping was not sent"]
    pub fn ping(&self) -> bool {
        self.publish_raw(PING_SEND_DESTINATION, String::new())
    }

    // ── Introspection ───────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Topics with a live subscription on the current connection.
    pub fn live_topics(&self) -> Vec<Topic> {
        lock(&self.inner.state).registry.live_topics()
    }

    /// Topics callers have asked for, in resubscribe order (ping excluded).
    pub fn requested_topics(&self) -> Vec<Topic> {
        lock(&self.inner.state).registry.requested()
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn connected_client(&self) -> Option<Arc<dyn PubSubClient>> {
        self.inner.current_client().filter(|c| c.is_connected())
    }

    fn subscribe(&self, topic: Topic, handler: Handler) -> Option<SubscriptionHandle> {
        let mut state = lock(&self.inner.state);
        state.registry.request(&topic, handler);

        let client = match &state.client {
            Some(client) if client.is_connected() => Arc::clone(client),
            _ => {
                debug!(topic = %topic, "subscribe queued: not connected yet");
                return None;
            }
        };
        let weak = Arc::downgrade(&self.inner);
        subscribe_topic(&weak, &mut state, &client, &topic)
    }

    fn unsubscribe(&self, topic: Topic, handler: Option<&Handler>) {
        let handle = {
            let mut state = lock(&self.inner.state);
            match handler {
                Some(handler) => state.registry.remove_handler(&topic, handler),
                None => state.registry.forget(&topic),
            }
        };
        if let Some(handle) = handle {
            debug!(topic = %topic, "tearing down live subscription");
            teardown(&topic, &handle);
        }
    }

    fn forget(&self, topic: &Topic) {
        let handle = lock(&self.inner.state).registry.forget(topic);
        if let Some(handle) = handle {
            teardown(topic, &handle);
        }
    }

    fn publish_json<T: serde::Serialize>(&self, destination: &str, body: &T) -> bool {
        match serde_json::to_string(body).map_err(ChatSocketError::from) {
            Ok(json) => self.publish_raw(destination, json),
            Err(e) => {
                error!(destination, "publish skipped: {e}");
                false
            }
        }
    }

    fn publish_raw(&self, destination: &str, body: String) -> bool {
        let Some(client) = self.connected_client() else {
            warn!(destination, "publish skipped: {}", ChatSocketError::NotConnected);
            return false;
        };
        match client.publish(destination, body) {
            Ok(()) => true,
            Err(e) => {
                warn!(destination, "publish failed: {e}");
                false
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("ConnectionManager")
            .field("has_client", &state.client.is_some())
            .field("connecting", &state.connecting)
            .field("generation", &state.generation)
            .field("live", &state.registry.live_topics())
            .finish()
    }
}
