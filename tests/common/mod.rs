#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for chat socket integration tests.
//!
//! Provides a recording [`MockPubSubClient`] and the [`MockClientFactory`]
//! that hands it to a `ConnectionManager`. Tests drive the lifecycle by hand
//! (`fire_connect`, `fire_close`) and push frames with `deliver`.
//!
//! For end-to-end tests over the real STOMP client, [`ChannelConnector`]
//! hands each connection's [`BrokerEnd`] to the test, which then plays the
//! broker frame by frame.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chat_socket_client::protocol::{parse_frames, Command, Frame};
use chat_socket_client::pubsub::FrameCallback;
use chat_socket_client::transport::{Connector, Transport};
use chat_socket_client::{
    ChatSocketConfig, ChatSocketError, ClientFactory, Handler, LifecycleListener, Payload,
    PubSubClient, Subscription, SubscriptionHandle,
};
use tokio::sync::mpsc;

// ── MockSubscription ────────────────────────────────────────────────

pub struct MockSubscription {
    id: String,
    destination: String,
    callback: FrameCallback,
    unsubscribed: AtomicUsize,
    /// The session this subscription belonged to has ended.
    dropped: AtomicBool,
    /// `unsubscribe` reports an error (the call is still counted).
    failing: AtomicBool,
}

impl MockSubscription {
    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribed.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.unsubscribe_calls() == 0 && !self.dropped.load(Ordering::SeqCst)
    }

    /// Make every later `unsubscribe` call fail.
    pub fn fail_unsubscribe(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

impl Subscription for MockSubscription {
    fn id(&self) -> &str {
        &self.id
    }

    fn destination(&self) -> &str {
        &self.destination
    }

    fn unsubscribe(&self) -> Result<(), ChatSocketError> {
        self.unsubscribed.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChatSocketError::TransportSend(format!(
                "unsubscribe {} rejected",
                self.id
            )));
        }
        Ok(())
    }
}

// ── MockPubSubClient ────────────────────────────────────────────────

#[derive(Default)]
struct MockState {
    connected: bool,
    activations: usize,
    deactivations: usize,
    subscriptions: Vec<Arc<MockSubscription>>,
    published: Vec<(String, String)>,
}

/// How a mock client reacts to `activate`.
#[derive(Debug, Clone, Copy)]
pub enum ActivateMode {
    /// Nothing happens until the test calls `fire_connect`.
    Manual,
    /// `on_connect` fires synchronously from `activate`.
    Immediate,
    /// `on_connect` fires from a spawned task after the delay.
    After(Duration),
}

/// A [`PubSubClient`] that records every call and never touches a network.
///
/// Honors the reentrancy contract: listener methods and frame callbacks are
/// only ever invoked from the `fire_*` / `deliver` helpers, never from inside
/// `subscribe` or `publish`, and never while the internal lock is held.
pub struct MockPubSubClient {
    pub credential: String,
    listener: Arc<dyn LifecycleListener>,
    mode: ActivateMode,
    this: Weak<MockPubSubClient>,
    state: StdMutex<MockState>,
}

impl MockPubSubClient {
    fn new(credential: &str, listener: Arc<dyn LifecycleListener>, mode: ActivateMode) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            credential: credential.to_string(),
            listener,
            mode,
            this: this.clone(),
            state: StdMutex::new(MockState::default()),
        })
    }

    /// Simulate the session being established.
    pub fn fire_connect(&self) {
        self.state.lock().unwrap().connected = true;
        self.listener.on_connect();
    }

    /// Simulate the session dropping. Subscriptions of that session die.
    pub fn fire_close(&self, reason: Option<&str>) {
        {
            let mut state = self.state.lock().unwrap();
            state.connected = false;
            for sub in &state.subscriptions {
                sub.dropped.store(true, Ordering::SeqCst);
            }
        }
        self.listener.on_close(reason);
    }

    pub fn fire_protocol_error(&self, message: &str) {
        self.listener.on_protocol_error(message);
    }

    /// Push `body` to every active subscription on `destination`.
    /// Returns how many subscriptions received it.
    pub fn deliver(&self, destination: &str, body: &str) -> usize {
        let callbacks: Vec<FrameCallback> = self
            .state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|s| s.destination == destination && s.is_active())
            .map(|s| Arc::clone(&s.callback))
            .collect();
        for callback in &callbacks {
            callback(body);
        }
        callbacks.len()
    }

    /// Total `subscribe` calls ever made for `destination`.
    pub fn subscribe_calls(&self, destination: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|s| s.destination == destination)
            .count()
    }

    /// Active subscriptions for `destination` on the current session.
    pub fn active_subscriptions(&self, destination: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|s| s.destination == destination && s.is_active())
            .count()
    }

    /// Destinations with an active subscription, in subscribe order.
    pub fn active_destinations(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.destination.clone())
            .collect()
    }

    /// Every destination subscribed to, in call order.
    pub fn subscribe_log(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .map(|s| s.destination.clone())
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<Arc<MockSubscription>> {
        self.state.lock().unwrap().subscriptions.clone()
    }

    /// Subscriptions made on the current session, in subscribe order.
    pub fn active(&self) -> Vec<Arc<MockSubscription>> {
        self.subscriptions()
            .into_iter()
            .filter(|s| s.is_active())
            .collect()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn activations(&self) -> usize {
        self.state.lock().unwrap().activations
    }

    pub fn deactivations(&self) -> usize {
        self.state.lock().unwrap().deactivations
    }

    /// The listener the manager handed to this client.
    pub fn listener(&self) -> Arc<dyn LifecycleListener> {
        Arc::clone(&self.listener)
    }
}

impl PubSubClient for MockPubSubClient {
    fn activate(&self) {
        self.state.lock().unwrap().activations += 1;
        match self.mode {
            ActivateMode::Manual => {}
            ActivateMode::Immediate => self.fire_connect(),
            ActivateMode::After(delay) => {
                let this = self.this.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(client) = this.upgrade() {
                        client.fire_connect();
                    }
                });
            }
        }
    }

    fn deactivate(&self) {
        let mut state = self.state.lock().unwrap();
        state.deactivations += 1;
        state.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn subscribe(
        &self,
        destination: &str,
        callback: FrameCallback,
    ) -> Result<SubscriptionHandle, ChatSocketError> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(ChatSocketError::NotConnected);
        }
        let sub = Arc::new(MockSubscription {
            id: format!("sub-{}", state.subscriptions.len()),
            destination: destination.to_string(),
            callback,
            unsubscribed: AtomicUsize::new(0),
            dropped: AtomicBool::new(false),
            failing: AtomicBool::new(false),
        });
        state.subscriptions.push(Arc::clone(&sub));
        Ok(sub)
    }

    fn publish(&self, destination: &str, body: String) -> Result<(), ChatSocketError> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(ChatSocketError::NotConnected);
        }
        state.published.push((destination.to_string(), body));
        Ok(())
    }
}

// ── MockClientFactory ───────────────────────────────────────────────

/// Builds [`MockPubSubClient`]s and keeps every one it built.
pub struct MockClientFactory {
    mode: ActivateMode,
    clients: StdMutex<Vec<Arc<MockPubSubClient>>>,
}

impl MockClientFactory {
    pub fn new(mode: ActivateMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            clients: StdMutex::new(Vec::new()),
        })
    }

    pub fn clients(&self) -> Vec<Arc<MockPubSubClient>> {
        self.clients.lock().unwrap().clone()
    }

    /// The most recently created client.
    pub fn last(&self) -> Arc<MockPubSubClient> {
        self.clients
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no client created yet")
    }

    pub fn created(&self) -> usize {
        self.clients.lock().unwrap().len()
    }
}

impl ClientFactory for MockClientFactory {
    fn create(
        &self,
        _config: &ChatSocketConfig,
        credential: &str,
        listener: Arc<dyn LifecycleListener>,
    ) -> Arc<dyn PubSubClient> {
        let client = MockPubSubClient::new(credential, listener, self.mode);
        self.clients.lock().unwrap().push(Arc::clone(&client));
        client
    }
}

// ── Handler helpers ─────────────────────────────────────────────────

/// A handler that records every payload it receives.
pub fn recording_handler() -> (Handler, Arc<StdMutex<Vec<Payload>>>) {
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler = Handler::from_fn(move |payload| sink.lock().unwrap().push(payload.clone()));
    (handler, seen)
}

/// A handler that only counts invocations.
pub fn counting_handler() -> (Handler, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let handler = Handler::from_fn(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (handler, count)
}

/// Config with short timings so waits stay fast in tests.
pub fn fast_config() -> ChatSocketConfig {
    ChatSocketConfig::default()
        .with_connect_timeout(Duration::from_millis(200))
        .with_poll_interval(Duration::from_millis(5))
        .with_reconnect_delay(Duration::from_millis(10))
}

pub const TOKEN: &str = "jwt-token";

// ── In-process broker ───────────────────────────────────────────────

/// How long broker helpers wait before failing the test.
pub const STEP: Duration = Duration::from_secs(2);

/// Client half of an in-process connection.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<Option<String>>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: String) -> Result<(), ChatSocketError> {
        self.tx
            .send(message)
            .map_err(|e| ChatSocketError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ChatSocketError>> {
        match self.rx.recv().await {
            Some(Some(text)) => Some(Ok(text)),
            Some(None) | None => None,
        }
    }

    async fn close(&mut self) -> Result<(), ChatSocketError> {
        Ok(())
    }
}

/// Broker half of an in-process connection, driven by the test.
pub struct BrokerEnd {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<Option<String>>,
}

impl BrokerEnd {
    /// Next frame the client sent.
    pub async fn next_frame(&mut self) -> Frame {
        let text = tokio::time::timeout(STEP, self.from_client.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client hung up");
        parse_frames(&text).unwrap().remove(0)
    }

    /// Next frame with `command`, skipping anything else.
    pub async fn next_of(&mut self, command: Command) -> Frame {
        loop {
            let frame = self.next_frame().await;
            if frame.command == command {
                return frame;
            }
        }
    }

    pub fn push(&self, frame: Frame) {
        self.to_client.send(Some(frame.encode())).unwrap();
    }

    /// Push a `MESSAGE` on subscription `id`.
    pub fn message(&self, id: &str, body: &str) {
        self.push(
            Frame::new(Command::Message)
                .with_header("subscription", id)
                .with_header("message-id", "m-1")
                .with_body(body),
        );
    }

    pub fn hang_up(&self) {
        let _ = self.to_client.send(None);
    }

    /// Read `CONNECT` and answer `CONNECTED`. Returns the `CONNECT` frame.
    pub async fn accept(&mut self) -> Frame {
        let connect = self.next_frame().await;
        assert_eq!(connect.command, Command::Connect);
        self.push(Frame::new(Command::Connected).with_header("version", "1.2"));
        connect
    }

    /// Nothing further was sent by the client within `wait`.
    pub async fn is_quiet(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.from_client.recv())
            .await
            .is_err()
    }
}

/// [`Connector`] that hands the broker half of every connection to the test.
pub struct ChannelConnector {
    brokers: mpsc::UnboundedSender<BrokerEnd>,
}

impl ChannelConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<BrokerEnd>) {
        let (brokers, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { brokers }), rx)
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>, ChatSocketError> {
        let (client_tx, from_client) = mpsc::unbounded_channel();
        let (to_client, client_rx) = mpsc::unbounded_channel();
        self.brokers
            .send(BrokerEnd {
                from_client,
                to_client,
            })
            .map_err(|_| ChatSocketError::TransportClosed)?;
        Ok(Box::new(ChannelTransport {
            tx: client_tx,
            rx: client_rx,
        }))
    }
}

/// Wait for the next connection the client opens.
pub async fn next_broker(brokers: &mut mpsc::UnboundedReceiver<BrokerEnd>) -> BrokerEnd {
    tokio::time::timeout(STEP, brokers.recv())
        .await
        .expect("timed out waiting for connection")
        .expect("connector dropped")
}

/// Poll `cond` until it holds or [`STEP`] elapses.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + STEP;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
