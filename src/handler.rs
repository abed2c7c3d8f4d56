//! Caller-supplied frame handlers.
//!
//! A [`Handler`] is compared by identity: cloning one and passing the clone
//! to `unsubscribe_room` removes the original registration. Two handlers built
//! from identical closures are still distinct.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::error;

use crate::error::{ChatSocketError, Result};

/// Error type handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type handlers return.
pub type HandlerResult = std::result::Result<(), HandlerError>;

type HandlerFn = dyn Fn(&Payload) -> HandlerResult + Send + Sync;

/// A decoded inbound frame body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The body parsed as JSON.
    Json(serde_json::Value),
    /// The body did not parse as JSON and is passed through unchanged.
    Raw(String),
}

impl Payload {
    /// Attempt a JSON decode, falling back to the raw body.
    pub fn decode(body: &str) -> Self {
        match serde_json::from_str(body) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Raw(body.to_string()),
        }
    }

    /// Deserialize a JSON payload into a typed body.
    ///
    /// Returns `None` for raw payloads or when the shape does not match.
    pub fn parse<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            Payload::Json(value) => T::deserialize(value).ok(),
            Payload::Raw(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Payload::Json(_) => None,
            Payload::Raw(text) => Some(text),
        }
    }
}

/// A shareable, identity-comparable frame callback.
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    /// Wrap a fallible callback.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Payload) -> HandlerResult + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Wrap a callback that cannot fail.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        Self(Arc::new(move |payload| {
            f(payload);
            Ok(())
        }))
    }

    /// Returns `true` if both values refer to the same registration.
    pub fn same(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Run the callback, converting both returned errors and panics into
    /// [`ChatSocketError::Handler`].
    pub(crate) fn invoke(&self, payload: &Payload) -> Result<()> {
        match catch_unwind(AssertUnwindSafe(|| (self.0)(payload))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ChatSocketError::Handler(e.to_string())),
            Err(panic) => Err(ChatSocketError::Handler(panic_message(&*panic))),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

/// Handlers for one topic, in registration order, without duplicates.
#[derive(Debug, Clone, Default)]
pub struct HandlerSet {
    handlers: Vec<Handler>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handler` unless that same handler is already present.
    /// Returns `true` if it was added.
    pub fn insert(&mut self, handler: Handler) -> bool {
        if self.contains(&handler) {
            return false;
        }
        self.handlers.push(handler);
        true
    }

    /// Remove `handler`. Returns `true` if it was present.
    pub fn remove(&mut self, handler: &Handler) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| !h.same(handler));
        self.handlers.len() != before
    }

    pub fn contains(&self, handler: &Handler) -> bool {
        self.handlers.iter().any(|h| h.same(handler))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Handler> {
        self.handlers.iter()
    }
}

/// Invoke every handler in order, isolating failures.
///
/// Returns the number of handlers that failed. A failing handler is logged and
/// never stops delivery to the ones after it.
pub(crate) fn dispatch(topic: &str, handlers: &[Handler], payload: &Payload) -> usize {
    let mut failures = 0;
    for handler in handlers {
        if let Err(e) = handler.invoke(payload) {
            failures += 1;
            error!(topic, "{e}");
        }
    }
    failures
}

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
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn decode_falls_back_to_raw() {
        assert_eq!(Payload::decode("pong"), Payload::Raw("pong".into()));
        assert_eq!(
            Payload::decode(r#"{"type":"ROOMS_CHANGED"}"#),
            Payload::Json(serde_json::json!({"type": "ROOMS_CHANGED"}))
        );
    }

    #[test]
    fn parse_typed_body() {
        let payload = Payload::decode(r#"{"type":"ROOMS_CHANGED"}"#);
        let ev: crate::protocol::RoomsEvent = payload.parse().unwrap();
        assert_eq!(ev.kind, "ROOMS_CHANGED");
        assert!(Payload::Raw("x".into())
            .parse::<crate::protocol::RoomsEvent>()
            .is_none());
    }

    #[test]
    fn set_dedups_by_identity() {
        let h = Handler::from_fn(|_| {});
        let twin = Handler::from_fn(|_| {});
        let mut set = HandlerSet::new();
        assert!(set.insert(h.clone()));
        assert!(!set.insert(h.clone()));
        assert!(set.insert(twin.clone()));
        assert_eq!(set.len(), 2);
        assert!(set.remove(&h));
        assert!(!set.contains(&h));
        assert!(set.contains(&twin));
    }

    #[test]
    fn dispatch_isolates_errors_and_panics() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let handlers = vec![
            Handler::new(|_| Err("boom".into())),
            Handler::from_fn(|_| panic!("kaboom")),
            Handler::from_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        ];
        let failures = dispatch("room:1", &handlers, &Payload::Raw("x".into()));
        assert_eq!(failures, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_preserves_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut set = HandlerSet::new();
        for i in 0..3 {
            let order = Arc::clone(&order);
            set.insert(Handler::from_fn(move |_| order.lock().unwrap().push(i)));
        }
        let handlers: Vec<Handler> = set.iter().cloned().collect();
        dispatch("rooms", &handlers, &Payload::Raw(String::new()));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
