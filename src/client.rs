//! STOMP session client with automatic reconnect.
//!
//! [`StompClient`] is the production [`PubSubClient`]. Activating it spawns a
//! background session loop that:
//!
//! 1. opens a transport through its [`Connector`],
//! 2. performs the `CONNECT`/`CONNECTED` handshake with the bearer credential,
//! 3. multiplexes outbound frames, inbound frames and the shutdown signal
//!    with `tokio::select!`,
//! 4. on any session end, reports `on_close`, waits the fixed reconnect delay
//!    and starts over until deactivated.
//!
//! Subscriptions belong to one session. They are dropped when the session
//! ends; re-establishing them is the listener's job.
//!
//! # Example
//!
//! ```rust,ignore
//! let factory = StompClientFactory::websocket();
//! let client = factory.create(&ChatSocketConfig::default(), "jwt", listener);
//! client.activate();
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{ChatSocketError, Result};
use crate::protocol::{parse_frames, Command, Frame};
use crate::pubsub::{
    ClientFactory, FrameCallback, LifecycleListener, PubSubClient, Subscription,
    SubscriptionHandle,
};
use crate::transport::{Connector, Transport};

/// Default broker endpoint (the backend's raw WebSocket STOMP endpoint).
pub const DEFAULT_URL: &str = "ws://localhost:8080/ws-chat/websocket";

/// Default delay between a session ending and the next connect attempt.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Default bound for the handshake and for `ensure_connected`.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

/// Default polling interval of `ensure_connected`.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lower bound for the polling interval.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Bound on sending `DISCONNECT` and closing the transport.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration shared by [`StompClient`] and
/// [`ConnectionManager`](crate::manager::ConnectionManager).
///
/// # Example
///
/// ```
/// use chat_socket_client::client::ChatSocketConfig;
/// use std::time::Duration;
///
/// let config = ChatSocketConfig::new("ws://chat.example:8080/ws-chat/websocket")
///     .with_reconnect_delay(Duration::from_secs(5));
/// assert_eq!(config.host, "chat.example");
/// assert_eq!(config.connect_timeout, Duration::from_secs(8));
/// ```
#[derive(Debug, Clone)]
pub struct ChatSocketConfig {
    /// Broker endpoint URL.
    pub url: String,
    /// Value of the `host` header sent in `CONNECT`. Derived from `url`.
    pub host: String,
    /// Fixed delay before each reconnect attempt.
    ///
    /// Defaults to **3 seconds**.
    pub reconnect_delay: Duration,
    /// Bound on the STOMP handshake and on `ensure_connected`.
    ///
    /// Defaults to **8 seconds**.
    pub connect_timeout: Duration,
    /// How often `ensure_connected` checks the connection.
    ///
    /// Defaults to **50 ms**. Values below 1 ms are clamped to 1 ms.
    pub poll_interval: Duration,
}

impl ChatSocketConfig {
    /// Create a configuration for `url` with default timings.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            host: host_of(&url),
            url,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the `host` header.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the fixed reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the `ensure_connected` polling interval (clamped to at least 1 ms).
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }
}

impl Default for ChatSocketConfig {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

/// `ws://user@host:port/path` → `host`.
fn host_of(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);
    let host = authority.split(':').next().unwrap_or_default();
    if host.is_empty() {
        "localhost".to_string()
    } else {
        host.to_string()
    }
}

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Shared session state ────────────────────────────────────────────

/// A frame queued for the session that was current when it was queued.
struct Outbound {
    session: u64,
    frame: Frame,
}

/// State shared between the client handle, its subscriptions and the loop.
struct SessionState {
    connected: AtomicBool,
    /// Incremented each time a session is established.
    session: AtomicU64,
    next_subscription: AtomicU64,
    subscriptions: Mutex<HashMap<String, FrameCallback>>,
    cmd_tx: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            session: AtomicU64::new(0),
            next_subscription: AtomicU64::new(0),
            subscriptions: Mutex::new(HashMap::new()),
            cmd_tx: Mutex::new(None),
        }
    }

    fn current_session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    fn queue(&self, session: u64, frame: Frame) -> Result<()> {
        let guard = lock(&self.cmd_tx);
        let tx = guard.as_ref().ok_or(ChatSocketError::NotConnected)?;
        tx.send(Outbound { session, frame })
            .map_err(|_| ChatSocketError::NotConnected)
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// STOMP implementation of [`PubSubClient`].
pub struct StompClient {
    config: ChatSocketConfig,
    credential: String,
    connector: Arc<dyn Connector>,
    listener: Arc<dyn LifecycleListener>,
    state: Arc<SessionState>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl StompClient {
    /// Create an inactive client. Call [`activate`](PubSubClient::activate)
    /// to start connecting.
    pub fn new(
        config: ChatSocketConfig,
        credential: impl Into<String>,
        connector: Arc<dyn Connector>,
        listener: Arc<dyn LifecycleListener>,
    ) -> Self {
        Self {
            config,
            credential: credential.into(),
            connector,
            listener,
            state: Arc::new(SessionState::new()),
            task: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
        }
    }
}

impl PubSubClient for StompClient {
    fn activate(&self) {
        let mut task = lock(&self.task);
        if task.is_some() {
            debug!("StompClient: already active");
            return;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!("StompClient: cannot activate outside a tokio runtime: {e}");
                return;
            }
        };

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Outbound>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        *lock(&self.state.cmd_tx) = Some(cmd_tx);
        *lock(&self.shutdown_tx) = Some(shutdown_tx);

        let session_loop = SessionLoop {
            url: self.config.url.clone(),
            host: self.config.host.clone(),
            credential: self.credential.clone(),
            reconnect_delay: self.config.reconnect_delay,
            connect_timeout: self.config.connect_timeout,
            connector: Arc::clone(&self.connector),
            listener: Arc::clone(&self.listener),
            state: Arc::clone(&self.state),
        };
        debug!(url = %self.config.url, "StompClient: activating");
        *task = Some(runtime.spawn(session_loop.run(cmd_rx, shutdown_rx)));
    }

    fn deactivate(&self) {
        debug!("StompClient: deactivate requested");
        if let Some(tx) = lock(&self.shutdown_tx).take() {
            let _ = tx.send(());
        }
        lock(&self.state.cmd_tx).take();
        self.state.connected.store(false, Ordering::Release);
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    fn subscribe(&self, destination: &str, callback: FrameCallback) -> Result<SubscriptionHandle> {
        if !self.is_connected() {
            return Err(ChatSocketError::NotConnected);
        }
        let session = self.state.current_session();
        let id = format!(
            "sub-{}",
            self.state.next_subscription.fetch_add(1, Ordering::Relaxed)
        );
        lock(&self.state.subscriptions).insert(id.clone(), callback);
        if let Err(e) = self.state.queue(session, Frame::subscribe(&id, destination)) {
            lock(&self.state.subscriptions).remove(&id);
            return Err(e);
        }
        debug!(destination, id = %id, "StompClient: subscribe queued");
        Ok(Arc::new(StompSubscription {
            id,
            destination: destination.to_string(),
            session,
            state: Arc::downgrade(&self.state),
        }))
    }

    fn publish(&self, destination: &str, body: String) -> Result<()> {
        if !self.is_connected() {
            return Err(ChatSocketError::NotConnected);
        }
        self.state
            .queue(self.state.current_session(), Frame::send(destination, body))
    }
}

impl std::fmt::Debug for StompClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StompClient")
            .field("url", &self.config.url)
            .field("connected", &self.is_connected())
            .field("session", &self.state.current_session())
            .finish()
    }
}

impl Drop for StompClient {
    fn drop(&mut self) {
        // A deactivated loop finishes its DISCONNECT on its own (bounded by
        // CLOSE_TIMEOUT); anything else is aborted since Drop cannot await.
        let deactivated = lock(&self.shutdown_tx).is_none();
        if let Some(task) = lock(&self.task).take() {
            if !deactivated {
                task.abort();
            }
        }
    }
}

/// Subscription handle returned by [`StompClient::subscribe`].
struct StompSubscription {
    id: String,
    destination: String,
    session: u64,
    state: Weak<SessionState>,
}

impl Subscription for StompSubscription {
    fn id(&self) -> &str {
        &self.id
    }

    fn destination(&self) -> &str {
        &self.destination
    }

    fn unsubscribe(&self) -> Result<()> {
        let Some(state) = self.state.upgrade() else {
            return Ok(());
        };
        lock(&state.subscriptions).remove(&self.id);
        // The broker already forgot subscriptions of an ended session.
        if state.connected.load(Ordering::Acquire) && state.current_session() == self.session {
            state.queue(self.session, Frame::unsubscribe(&self.id))?;
        }
        Ok(())
    }
}

// ── Factory ─────────────────────────────────────────────────────────

/// [`ClientFactory`] producing [`StompClient`]s over a shared [`Connector`].
#[derive(Clone)]
pub struct StompClientFactory {
    connector: Arc<dyn Connector>,
}

impl StompClientFactory {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Factory using [`WebSocketConnector`](crate::transports::WebSocketConnector).
    #[cfg(feature = "transport-websocket")]
    pub fn websocket() -> Self {
        Self::new(Arc::new(crate::transports::WebSocketConnector))
    }
}

impl ClientFactory for StompClientFactory {
    fn create(
        &self,
        config: &ChatSocketConfig,
        credential: &str,
        listener: Arc<dyn LifecycleListener>,
    ) -> Arc<dyn PubSubClient> {
        Arc::new(StompClient::new(
            config.clone(),
            credential,
            Arc::clone(&self.connector),
            listener,
        ))
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// How one session ended.
enum SessionEnd {
    /// Deactivated; do not reconnect.
    Shutdown,
    /// Lost or refused; reconnect after the delay.
    Closed(Option<String>),
}

struct SessionLoop {
    url: String,
    host: String,
    credential: String,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    connector: Arc<dyn Connector>,
    listener: Arc<dyn LifecycleListener>,
    state: Arc<SessionState>,
}

impl SessionLoop {
    /// Run sessions until deactivated.
    async fn run(
        self,
        mut cmd_rx: mpsc::UnboundedReceiver<Outbound>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        debug!("session loop started");

        loop {
            let opened = tokio::select! {
                _ = &mut shutdown_rx => None,
                opened = self.open() => Some(opened),
            };
            let end = match opened {
                None => SessionEnd::Shutdown,
                Some(Ok(transport)) => self.serve(transport, &mut cmd_rx, &mut shutdown_rx).await,
                Some(Err(e)) => {
                    self.report(&e);
                    SessionEnd::Closed(Some(e.to_string()))
                }
            };

            match end {
                SessionEnd::Shutdown => {
                    self.end_session(Some("client deactivated"));
                    break;
                }
                SessionEnd::Closed(reason) => self.end_session(reason.as_deref()),
            }

            debug!(delay = ?self.reconnect_delay, "reconnecting after delay");
            let stop = tokio::select! {
                _ = &mut shutdown_rx => true,
                () = tokio::time::sleep(self.reconnect_delay) => false,
            };
            if stop {
                break;
            }
        }

        debug!("session loop exited");
    }

    /// Connect the transport and complete the STOMP handshake.
    async fn open(&self) -> Result<Box<dyn Transport>> {
        debug!(url = %self.url, "opening STOMP session");
        let mut transport = self.connector.connect(&self.url).await?;
        transport
            .send(Frame::connect(&self.host, &self.credential).encode())
            .await?;

        match tokio::time::timeout(self.connect_timeout, await_connected(&mut transport)).await {
            Ok(Ok(())) => Ok(transport),
            Ok(Err(e)) => {
                let _ = transport.close().await;
                Err(e)
            }
            Err(_) => {
                let _ = transport.close().await;
                Err(ChatSocketError::ConnectTimeout)
            }
        }
    }

    /// Drive an established session until it ends.
    async fn serve(
        &self,
        mut transport: Box<dyn Transport>,
        cmd_rx: &mut mpsc::UnboundedReceiver<Outbound>,
        shutdown_rx: &mut oneshot::Receiver<()>,
    ) -> SessionEnd {
        let session = self.state.session.fetch_add(1, Ordering::AcqRel) + 1;
        lock(&self.state.subscriptions).clear();
        self.state.connected.store(true, Ordering::Release);
        info!(url = %self.url, session, "STOMP session established");
        self.listener.on_connect();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(out) if out.session != session => {
                            debug!(
                                "dropping {} queued for session {}",
                                out.frame.command, out.session
                            );
                        }
                        Some(out) => {
                            if let Err(e) = transport.send(out.frame.encode()).await {
                                error!("transport send error: {e}");
                                self.listener.on_transport_error(&e);
                                return SessionEnd::Closed(Some(e.to_string()));
                            }
                        }
                        // Command channel closed — client deactivated or dropped.
                        None => {
                            close_transport(&mut transport).await;
                            return SessionEnd::Shutdown;
                        }
                    }
                }

                _ = &mut *shutdown_rx => {
                    debug!("shutdown signal received");
                    close_transport(&mut transport).await;
                    return SessionEnd::Shutdown;
                }

                incoming = transport.recv() => {
                    match incoming {
                        Some(Ok(text)) => self.handle_incoming(&text),
                        Some(Err(e)) => {
                            error!("transport receive error: {e}");
                            self.listener.on_transport_error(&e);
                            return SessionEnd::Closed(Some(e.to_string()));
                        }
                        None => {
                            debug!("transport closed by broker");
                            return SessionEnd::Closed(None);
                        }
                    }
                }
            }
        }
    }

    fn handle_incoming(&self, text: &str) {
        let frames = match parse_frames(text) {
            Ok(frames) => frames,
            Err(e) => {
                warn!("dropping malformed frame: {e}");
                return;
            }
        };
        for frame in frames {
            match frame.command {
                Command::Message => {
                    let Some(id) = frame.header("subscription") else {
                        warn!("MESSAGE frame without subscription header");
                        continue;
                    };
                    // Clone out so the callback runs without the table locked.
                    let callback = lock(&self.state.subscriptions).get(id).cloned();
                    match callback {
                        Some(callback) => callback(&frame.body),
                        None => debug!(subscription = id, "frame for inactive subscription"),
                    }
                }
                Command::Error => {
                    let message = error_message(&frame);
                    error!("broker error: {message}");
                    self.listener.on_protocol_error(&message);
                }
                other => debug!("ignoring {other} frame"),
            }
        }
    }

    fn report(&self, e: &ChatSocketError) {
        match e {
            ChatSocketError::Protocol { message } => {
                error!("broker refused connection: {message}");
                self.listener.on_protocol_error(message);
            }
            other => {
                warn!("connect attempt failed: {other}");
                self.listener.on_transport_error(other);
            }
        }
    }

    fn end_session(&self, reason: Option<&str>) {
        self.state.connected.store(false, Ordering::Release);
        lock(&self.state.subscriptions).clear();
        debug!(reason, "STOMP session ended");
        self.listener.on_close(reason);
    }
}

/// Read frames until `CONNECTED` (or a refusal) arrives.
async fn await_connected(transport: &mut Box<dyn Transport>) -> Result<()> {
    loop {
        let text = match transport.recv().await {
            Some(Ok(text)) => text,
            Some(Err(e)) => return Err(e),
            None => return Err(ChatSocketError::TransportClosed),
        };
        for frame in parse_frames(&text)? {
            match frame.command {
                Command::Connected => return Ok(()),
                Command::Error => {
                    return Err(ChatSocketError::Protocol {
                        message: error_message(&frame),
                    })
                }
                other => debug!("ignoring {other} before CONNECTED"),
            }
        }
    }
}

async fn close_transport(transport: &mut Box<dyn Transport>) {
    let graceful = async {
        if let Err(e) = transport.send(Frame::new(Command::Disconnect).encode()).await {
            debug!("DISCONNECT not delivered: {e}");
        }
        if let Err(e) = transport.close().await {
            debug!("transport close failed: {e}");
        }
    };
    if tokio::time::timeout(CLOSE_TIMEOUT, graceful).await.is_err() {
        warn!("transport close timed out after {CLOSE_TIMEOUT:?}");
    }
}

fn error_message(frame: &Frame) -> String {
    match frame.header("message") {
        Some(message) => message.to_string(),
        None => frame.body.clone(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    const STEP: Duration = Duration::from_secs(2);

    // ── Channel transport ───────────────────────────────────────────

    /// Client half: what the session loop drives.
    struct ChannelTransport {
        tx: mpsc::UnboundedSender<String>,
        rx: mpsc::UnboundedReceiver<Option<String>>,
    }

    /// Broker half: what the test drives.
    struct BrokerEnd {
        from_client: mpsc::UnboundedReceiver<String>,
        to_client: mpsc::UnboundedSender<Option<String>>,
    }

    impl BrokerEnd {
        async fn next_frame(&mut self) -> Frame {
            let text = tokio::time::timeout(STEP, self.from_client.recv())
                .await
                .expect("timed out waiting for client frame")
                .expect("client hung up");
            parse_frames(&text).unwrap().remove(0)
        }

        fn push(&self, frame: Frame) {
            self.to_client.send(Some(frame.encode())).unwrap();
        }

        fn hang_up(&self) {
            self.to_client.send(None).unwrap();
        }

        async fn accept(&mut self) -> Frame {
            let connect = self.next_frame().await;
            self.push(Frame::new(Command::Connected).with_header("version", "1.2"));
            connect
        }
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn send(&mut self, message: String) -> Result<()> {
            self.tx
                .send(message)
                .map_err(|e| ChatSocketError::TransportSend(e.to_string()))
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            match self.rx.recv().await {
                Some(Some(text)) => Some(Ok(text)),
                Some(None) | None => None,
            }
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct ChannelConnector {
        brokers: mpsc::UnboundedSender<BrokerEnd>,
    }

    #[async_trait]
    impl Connector for ChannelConnector {
        async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>> {
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

    // ── Recording listener ──────────────────────────────────────────

    #[derive(Debug, PartialEq)]
    enum Event {
        Connected,
        Closed(Option<String>),
        TransportError,
        ProtocolError(String),
    }

    struct Recorder(mpsc::UnboundedSender<Event>);

    impl LifecycleListener for Recorder {
        fn on_connect(&self) {
            let _ = self.0.send(Event::Connected);
        }
        fn on_close(&self, reason: Option<&str>) {
            let _ = self.0.send(Event::Closed(reason.map(str::to_string)));
        }
        fn on_transport_error(&self, _error: &ChatSocketError) {
            let _ = self.0.send(Event::TransportError);
        }
        fn on_protocol_error(&self, message: &str) {
            let _ = self.0.send(Event::ProtocolError(message.to_string()));
        }
    }

    struct Harness {
        client: StompClient,
        brokers: mpsc::UnboundedReceiver<BrokerEnd>,
        events: mpsc::UnboundedReceiver<Event>,
    }

    impl Harness {
        fn new() -> Self {
            let (brokers_tx, brokers) = mpsc::unbounded_channel();
            let (events_tx, events) = mpsc::unbounded_channel();
            let config = ChatSocketConfig::new("ws://broker.test:8080/ws-chat/websocket")
                .with_reconnect_delay(Duration::from_millis(10))
                .with_connect_timeout(Duration::from_millis(500));
            let client = StompClient::new(
                config,
                "jwt-123",
                Arc::new(ChannelConnector {
                    brokers: brokers_tx,
                }),
                Arc::new(Recorder(events_tx)),
            );
            Self {
                client,
                brokers,
                events,
            }
        }

        async fn broker(&mut self) -> BrokerEnd {
            tokio::time::timeout(STEP, self.brokers.recv())
                .await
                .expect("timed out waiting for connection")
                .expect("connector dropped")
        }

        async fn event(&mut self) -> Event {
            tokio::time::timeout(STEP, self.events.recv())
                .await
                .expect("timed out waiting for lifecycle event")
                .expect("listener dropped")
        }

        async fn connected(&mut self) -> BrokerEnd {
            self.client.activate();
            let mut broker = self.broker().await;
            broker.accept().await;
            assert_eq!(self.event().await, Event::Connected);
            broker
        }
    }

    fn collector() -> (FrameCallback, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: FrameCallback = Arc::new(move |body: &str| {
            let _ = tx.send(body.to_string());
        });
        (callback, rx)
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[test]
    fn config_defaults() {
        let config = ChatSocketConfig::default();
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.connect_timeout, Duration::from_secs(8));
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn poll_interval_is_clamped() {
        let config = ChatSocketConfig::default().with_poll_interval(Duration::ZERO);
        assert_eq!(config.poll_interval, Duration::from_millis(1));
    }

    #[test]
    fn host_is_derived_from_url() {
        assert_eq!(host_of("wss://user@chat.example.com:443/ws"), "chat.example.com");
        assert_eq!(host_of("ws://10.0.0.2/ws-chat"), "10.0.0.2");
        assert_eq!(host_of(""), "localhost");
    }

    #[test]
    fn activate_without_runtime_is_a_logged_noop() {
        let harness = Harness::new();
        harness.client.activate();
        assert!(!harness.client.is_connected());
    }

    #[tokio::test]
    async fn handshake_sends_bearer_credential() {
        let mut h = Harness::new();
        h.client.activate();
        let mut broker = h.broker().await;
        let connect = broker.accept().await;

        assert_eq!(connect.command, Command::Connect);
        assert_eq!(connect.header("Authorization"), Some("Bearer jwt-123"));
        assert_eq!(connect.header("host"), Some("broker.test"));
        assert_eq!(connect.header("accept-version"), Some("1.2"));

        assert_eq!(h.event().await, Event::Connected);
        assert!(h.client.is_connected());
    }

    #[tokio::test]
    async fn activate_twice_opens_one_connection() {
        let mut h = Harness::new();
        h.client.activate();
        h.client.activate();
        let _broker = h.broker().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.brokers.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscribe_routes_messages_by_subscription_id() {
        let mut h = Harness::new();
        let mut broker = h.connected().await;

        let (callback, mut bodies) = collector();
        let sub = h.client.subscribe("/topic/room/7", callback).unwrap();
        assert_eq!(sub.destination(), "/topic/room/7");

        let frame = broker.next_frame().await;
        assert_eq!(frame.command, Command::Subscribe);
        assert_eq!(frame.header("destination"), Some("/topic/room/7"));
        assert_eq!(frame.header("id"), Some(sub.id()));

        broker.push(
            Frame::new(Command::Message)
                .with_header("subscription", sub.id())
                .with_header("destination", "/topic/room/7")
                .with_body(r#"{"content":"hi"}"#),
        );
        broker.push(
            Frame::new(Command::Message)
                .with_header("subscription", "sub-999")
                .with_body("stray"),
        );
        broker.push(
            Frame::new(Command::Message)
                .with_header("subscription", sub.id())
                .with_body("second"),
        );

        let first = tokio::time::timeout(STEP, bodies.recv()).await.unwrap().unwrap();
        let second = tokio::time::timeout(STEP, bodies.recv()).await.unwrap().unwrap();
        assert_eq!(first, r#"{"content":"hi"}"#);
        assert_eq!(second, "second");
    }

    #[tokio::test]
    async fn unsubscribe_sends_unsubscribe_frame() {
        let mut h = Harness::new();
        let mut broker = h.connected().await;

        let (callback, _bodies) = collector();
        let sub = h.client.subscribe("/user/queue/rooms", callback).unwrap();
        let _ = broker.next_frame().await;

        sub.unsubscribe().unwrap();
        let frame = broker.next_frame().await;
        assert_eq!(frame.command, Command::Unsubscribe);
        assert_eq!(frame.header("id"), Some(sub.id()));
    }

    #[tokio::test]
    async fn publish_sends_json_send_frame() {
        let mut h = Harness::new();
        let mut broker = h.connected().await;

        h.client
            .publish("/app/chat/send", r#"{"roomId":1,"content":"hi"}"#.to_string())
            .unwrap();
        let frame = broker.next_frame().await;
        assert_eq!(frame.command, Command::Send);
        assert_eq!(frame.header("destination"), Some("/app/chat/send"));
        assert_eq!(frame.body, r#"{"roomId":1,"content":"hi"}"#);
    }

    #[tokio::test]
    async fn operations_fail_while_disconnected() {
        let h = Harness::new();
        let (callback, _bodies) = collector();
        assert!(matches!(
            h.client.subscribe("/user/queue/rooms", callback),
            Err(ChatSocketError::NotConnected)
        ));
        assert!(matches!(
            h.client.publish("/app/ping", String::new()),
            Err(ChatSocketError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn reconnects_after_broker_hang_up() {
        let mut h = Harness::new();
        let broker = h.connected().await;

        let (callback, _bodies) = collector();
        let old = h.client.subscribe("/topic/room/1", callback).unwrap();

        broker.hang_up();
        assert_eq!(h.event().await, Event::Closed(None));
        assert!(!h.client.is_connected());

        let mut second = h.broker().await;
        let connect = second.accept().await;
        assert_eq!(connect.command, Command::Connect);
        assert_eq!(h.event().await, Event::Connected);
        assert!(h.client.is_connected());

        // Unsubscribing a handle from the old session must not reach the new one.
        old.unsubscribe().unwrap();
        h.client.publish("/app/ping", String::new()).unwrap();
        let frame = second.next_frame().await;
        assert_eq!(frame.command, Command::Send);
    }

    #[tokio::test]
    async fn error_frame_during_handshake_is_a_protocol_error() {
        let mut h = Harness::new();
        h.client.activate();
        let mut broker = h.broker().await;
        let _ = broker.next_frame().await;
        broker.push(Frame::new(Command::Error).with_header("message", "bad token"));

        assert_eq!(h.event().await, Event::ProtocolError("bad token".into()));
        assert!(matches!(h.event().await, Event::Closed(Some(_))));
        assert!(!h.client.is_connected());

        // The reconnect policy keeps trying.
        let _retry = h.broker().await;
    }

    #[tokio::test]
    async fn error_frame_in_session_is_reported() {
        let mut h = Harness::new();
        let broker = h.connected().await;
        broker.push(Frame::new(Command::Error).with_body("subscription denied"));
        assert_eq!(
            h.event().await,
            Event::ProtocolError("subscription denied".into())
        );
    }

    #[tokio::test]
    async fn malformed_frames_do_not_end_the_session() {
        let mut h = Harness::new();
        let mut broker = h.connected().await;
        broker.to_client.send(Some("GARBAGE\n\n\0".into())).unwrap();
        broker.to_client.send(Some("\n".into())).unwrap();

        h.client.publish("/app/ping", String::new()).unwrap();
        let frame = broker.next_frame().await;
        assert_eq!(frame.command, Command::Send);
        assert!(h.client.is_connected());
    }

    #[tokio::test]
    async fn deactivate_disconnects_and_stops_reconnecting() {
        let mut h = Harness::new();
        let mut broker = h.connected().await;

        h.client.deactivate();
        assert!(!h.client.is_connected());

        let frame = broker.next_frame().await;
        assert_eq!(frame.command, Command::Disconnect);
        assert_eq!(
            h.event().await,
            Event::Closed(Some("client deactivated".into()))
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.brokers.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_after_deactivate_still_disconnects() {
        let mut h = Harness::new();
        let mut broker = h.connected().await;

        let Harness { client, .. } = h;
        client.deactivate();
        drop(client);

        assert_eq!(broker.next_frame().await.command, Command::Disconnect);
    }

    #[tokio::test]
    async fn dropping_an_active_client_aborts_the_session() {
        let mut h = Harness::new();
        let mut broker = h.connected().await;

        let Harness { client, .. } = h;
        drop(client);

        let hung_up = tokio::time::timeout(STEP, broker.from_client.recv())
            .await
            .expect("transport should be dropped");
        assert!(hung_up.is_none());
    }

    #[tokio::test]
    async fn handshake_timeout_reports_transport_error() {
        let mut h = Harness::new();
        h.client.activate();
        let mut broker = h.broker().await;
        let _ = broker.next_frame().await;
        // Never answer CONNECT.
        assert_eq!(h.event().await, Event::TransportError);
        assert!(matches!(h.event().await, Event::Closed(Some(_))));
        drop(broker);
    }
}
