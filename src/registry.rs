//! Subscription bookkeeping, independent of any transport.
//!
//! [`Registry`] holds three kinds of state per topic family:
//!
//! - **handlers**: who wants the frames,
//! - **requested**: durable intent to be subscribed, surviving disconnects,
//! - **live**: the transport's subscription handles, valid for one session.
//!
//! [`Registry::reconcile`] is the pure resubscribe pass: given the current
//! state it lists the topics that must be subscribed to make `live` match
//! `requested`. It is idempotent, so it runs on every connect without caring
//! whether the connect is the first one.

use std::collections::HashMap;

use crate::handler::{Handler, HandlerSet};
use crate::topic::{RoomId, Topic};

/// Per-room family (`room:{id}` or `roomRead:{id}`).
#[derive(Debug)]
struct RoomFamily<L> {
    handlers: HashMap<RoomId, HandlerSet>,
    /// Insertion-ordered, no duplicates.
    requested: Vec<RoomId>,
    live: HashMap<RoomId, L>,
}

impl<L> Default for RoomFamily<L> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            requested: Vec::new(),
            live: HashMap::new(),
        }
    }
}

impl<L> RoomFamily<L> {
    fn has_handlers(&self, id: &RoomId) -> bool {
        self.handlers.get(id).is_some_and(|set| !set.is_empty())
    }

    fn request(&mut self, id: &RoomId) {
        if !self.requested.contains(id) {
            self.requested.push(id.clone());
        }
    }

    fn forget(&mut self, id: &RoomId) -> Option<L> {
        self.handlers.remove(id);
        self.requested.retain(|r| r != id);
        self.live.remove(id)
    }

    fn remove_handler(&mut self, id: &RoomId, handler: &Handler) -> Option<L> {
        let emptied = match self.handlers.get_mut(id) {
            Some(set) => {
                set.remove(handler);
                set.is_empty()
            }
            None => false,
        };
        if emptied {
            self.forget(id)
        } else {
            None
        }
    }

    fn clear(&mut self) {
        self.handlers.clear();
        self.requested.clear();
        self.live.clear();
    }
}

/// Handlers, requested topics and live subscriptions for every family.
///
/// `L` is the live subscription handle type; the manager stores transport
/// handles, tests can use anything.
#[derive(Debug)]
pub struct Registry<L> {
    rooms_handlers: HandlerSet,
    rooms_requested: bool,
    rooms_live: Option<L>,
    room: RoomFamily<L>,
    room_read: RoomFamily<L>,
    ping_handler: Option<Handler>,
    ping_live: Option<L>,
}

impl<L> Default for Registry<L> {
    fn default() -> Self {
        Self {
            rooms_handlers: HandlerSet::new(),
            rooms_requested: false,
            rooms_live: None,
            room: RoomFamily::default(),
            room_read: RoomFamily::default(),
            ping_handler: None,
            ping_live: None,
        }
    }
}

impl<L> Registry<L> {
    pub fn new() -> Self {
        Self::default()
    }

    fn family(&self, topic: &Topic) -> Option<(&RoomFamily<L>, RoomId)> {
        match topic {
            Topic::Room(id) => Some((&self.room, id.clone())),
            Topic::RoomRead(id) => Some((&self.room_read, id.clone())),
            Topic::Rooms | Topic::Ping => None,
        }
    }

    fn family_mut(&mut self, topic: &Topic) -> Option<(&mut RoomFamily<L>, RoomId)> {
        match topic {
            Topic::Room(id) => Some((&mut self.room, id.clone())),
            Topic::RoomRead(id) => Some((&mut self.room_read, id.clone())),
            Topic::Rooms | Topic::Ping => None,
        }
    }

    /// Register `handler` for `topic` and mark the topic requested.
    ///
    /// For [`Topic::Ping`] the handler replaces the previous liveness
    /// callback; ping is requested for as long as a callback is set.
    pub fn request(&mut self, topic: &Topic, handler: Handler) {
        match topic {
            Topic::Rooms => {
                self.rooms_handlers.insert(handler);
                self.rooms_requested = true;
            }
            Topic::Ping => self.ping_handler = Some(handler),
            Topic::Room(_) | Topic::RoomRead(_) => {
                if let Some((family, id)) = self.family_mut(topic) {
                    family.handlers.entry(id.clone()).or_default().insert(handler);
                    family.request(&id);
                }
            }
        }
    }

    /// Remove one handler. If it was the last one for a per-room topic, the
    /// request is dropped too and the live handle (if any) is returned for
    /// teardown.
    pub fn remove_handler(&mut self, topic: &Topic, handler: &Handler) -> Option<L> {
        match topic {
            Topic::Rooms => {
                self.rooms_handlers.remove(handler);
                None
            }
            Topic::Ping => {
                if self.ping_handler.as_ref().is_some_and(|h| h.same(handler)) {
                    self.ping_handler = None;
                }
                None
            }
            Topic::Room(_) | Topic::RoomRead(_) => self
                .family_mut(topic)
                .and_then(|(family, id)| family.remove_handler(&id, handler)),
        }
    }

    /// Drop every handler, the request and the live handle for `topic`.
    /// Returns the live handle (if any) for teardown.
    pub fn forget(&mut self, topic: &Topic) -> Option<L> {
        match topic {
            Topic::Rooms => {
                self.rooms_handlers = HandlerSet::new();
                self.rooms_requested = false;
                self.rooms_live.take()
            }
            Topic::Ping => {
                self.ping_handler = None;
                self.ping_live.take()
            }
            Topic::Room(_) | Topic::RoomRead(_) => self
                .family_mut(topic)
                .and_then(|(family, id)| family.forget(&id)),
        }
    }

    /// Handlers for `topic`, in registration order.
    pub fn handlers(&self, topic: &Topic) -> Vec<Handler> {
        match topic {
            Topic::Rooms => self.rooms_handlers.iter().cloned().collect(),
            Topic::Ping => self.ping_handler.iter().cloned().collect(),
            Topic::Room(_) | Topic::RoomRead(_) => self
                .family(topic)
                .and_then(|(family, id)| family.handlers.get(&id).map(|set| set.iter().cloned().collect()))
                .unwrap_or_default(),
        }
    }

    pub fn has_handlers(&self, topic: &Topic) -> bool {
        match topic {
            Topic::Rooms => !self.rooms_handlers.is_empty(),
            Topic::Ping => self.ping_handler.is_some(),
            Topic::Room(_) | Topic::RoomRead(_) => self
                .family(topic)
                .is_some_and(|(family, id)| family.has_handlers(&id)),
        }
    }

    pub fn is_requested(&self, topic: &Topic) -> bool {
        match topic {
            Topic::Rooms => self.rooms_requested,
            Topic::Ping => self.ping_handler.is_some(),
            Topic::Room(_) | Topic::RoomRead(_) => self
                .family(topic)
                .is_some_and(|(family, id)| family.requested.contains(&id)),
        }
    }

    /// Requested topics in resubscribe order (ping excluded).
    pub fn requested(&self) -> Vec<Topic> {
        let mut out = Vec::new();
        if self.rooms_requested {
            out.push(Topic::Rooms);
        }
        out.extend(self.room.requested.iter().cloned().map(Topic::Room));
        out.extend(self.room_read.requested.iter().cloned().map(Topic::RoomRead));
        out
    }

    pub fn live(&self, topic: &Topic) -> Option<&L> {
        match topic {
            Topic::Rooms => self.rooms_live.as_ref(),
            Topic::Ping => self.ping_live.as_ref(),
            Topic::Room(_) | Topic::RoomRead(_) => self
                .family(topic)
                .and_then(|(family, id)| family.live.get(&id)),
        }
    }

    pub fn is_live(&self, topic: &Topic) -> bool {
        self.live(topic).is_some()
    }

    /// Record the live handle for `topic`, returning any handle it replaces.
    pub fn set_live(&mut self, topic: &Topic, handle: L) -> Option<L> {
        match topic {
            Topic::Rooms => self.rooms_live.replace(handle),
            Topic::Ping => self.ping_live.replace(handle),
            Topic::Room(_) | Topic::RoomRead(_) => self
                .family_mut(topic)
                .and_then(|(family, id)| family.live.insert(id, handle)),
        }
    }

    /// Live topics in resubscribe order.
    pub fn live_topics(&self) -> Vec<Topic> {
        let mut out = Vec::new();
        if self.rooms_live.is_some() {
            out.push(Topic::Rooms);
        }
        let mut rooms: Vec<_> = self.room.live.keys().cloned().collect();
        rooms.sort();
        out.extend(rooms.into_iter().map(Topic::Room));
        let mut reads: Vec<_> = self.room_read.live.keys().cloned().collect();
        reads.sort();
        out.extend(reads.into_iter().map(Topic::RoomRead));
        if self.ping_live.is_some() {
            out.push(Topic::Ping);
        }
        out
    }

    /// Empty the live set, returning every handle for teardown. Handlers and
    /// requests are untouched.
    pub fn take_live(&mut self) -> Vec<(Topic, L)> {
        let mut out = Vec::new();
        if let Some(handle) = self.rooms_live.take() {
            out.push((Topic::Rooms, handle));
        }
        out.extend(self.room.live.drain().map(|(id, h)| (Topic::Room(id), h)));
        out.extend(self.room_read.live.drain().map(|(id, h)| (Topic::RoomRead(id), h)));
        if let Some(handle) = self.ping_live.take() {
            out.push((Topic::Ping, handle));
        }
        out
    }

    /// Drop all handlers, requests and live handles.
    pub fn clear(&mut self) {
        self.rooms_handlers = HandlerSet::new();
        self.rooms_requested = false;
        self.rooms_live = None;
        self.room.clear();
        self.room_read.clear();
        self.ping_handler = None;
        self.ping_live = None;
    }

    /// Topics to subscribe so that every requested topic with at least one
    /// handler is live.
    ///
    /// Order: rooms, room messages, room reads, ping. Requested topics whose
    /// handlers have all gone are skipped but left requested.
    pub fn reconcile(&self) -> Vec<Topic> {
        let mut actions = Vec::new();
        if self.rooms_requested && !self.rooms_handlers.is_empty() && self.rooms_live.is_none() {
            actions.push(Topic::Rooms);
        }
        for id in &self.room.requested {
            if self.room.has_handlers(id) && !self.room.live.contains_key(id) {
                actions.push(Topic::Room(id.clone()));
            }
        }
        for id in &self.room_read.requested {
            if self.room_read.has_handlers(id) && !self.room_read.live.contains_key(id) {
                actions.push(Topic::RoomRead(id.clone()));
            }
        }
        if self.ping_handler.is_some() && self.ping_live.is_none() {
            actions.push(Topic::Ping);
        }
        actions
    }
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

    fn handler() -> Handler {
        Handler::from_fn(|_| {})
    }

    fn room(id: &str) -> Topic {
        Topic::Room(RoomId::from(id))
    }

    fn read(id: &str) -> Topic {
        Topic::RoomRead(RoomId::from(id))
    }

    #[test]
    fn empty_registry_needs_nothing() {
        let reg: Registry<u32> = Registry::new();
        assert!(reg.reconcile().is_empty());
    }

    #[test]
    fn reconcile_orders_families() {
        let mut reg: Registry<u32> = Registry::new();
        reg.request(&read("1"), handler());
        reg.request(&room("2"), handler());
        reg.request(&room("1"), handler());
        reg.request(&Topic::Rooms, handler());
        reg.request(&Topic::Ping, handler());
        assert_eq!(
            reg.reconcile(),
            vec![Topic::Rooms, room("2"), room("1"), read("1"), Topic::Ping]
        );
    }

    #[test]
    fn reconcile_skips_live_topics() {
        let mut reg: Registry<u32> = Registry::new();
        reg.request(&room("1"), handler());
        reg.request(&room("2"), handler());
        reg.request(&Topic::Ping, handler());
        reg.set_live(&room("1"), 10);
        reg.set_live(&Topic::Ping, 11);
        assert_eq!(reg.reconcile(), vec![room("2")]);
    }

    #[test]
    fn reconcile_is_idempotent_once_applied() {
        let mut reg: Registry<u32> = Registry::new();
        reg.request(&Topic::Rooms, handler());
        reg.request(&room("3"), handler());
        for (n, topic) in reg.reconcile().into_iter().enumerate() {
            reg.set_live(&topic, n as u32);
        }
        assert!(reg.reconcile().is_empty());
    }

    #[test]
    fn take_live_keeps_requests_and_handlers() {
        let mut reg: Registry<u32> = Registry::new();
        let h = handler();
        reg.request(&room("1"), h.clone());
        reg.request(&Topic::Ping, handler());
        reg.set_live(&room("1"), 1);
        reg.set_live(&Topic::Ping, 2);
        let taken = reg.take_live();
        assert_eq!(taken.len(), 2);
        assert!(reg.live_topics().is_empty());
        assert!(reg.is_requested(&room("1")));
        assert!(reg.has_handlers(&room("1")));
        assert_eq!(reg.reconcile(), vec![room("1"), Topic::Ping]);
    }

    #[test]
    fn removing_last_handler_drops_request_and_returns_live() {
        let mut reg: Registry<u32> = Registry::new();
        let h1 = handler();
        let h2 = handler();
        reg.request(&room("1"), h1.clone());
        reg.request(&room("1"), h2.clone());
        reg.set_live(&room("1"), 7);

        assert_eq!(reg.remove_handler(&room("1"), &h1), None);
        assert!(reg.is_live(&room("1")));
        assert!(reg.is_requested(&room("1")));

        assert_eq!(reg.remove_handler(&room("1"), &h2), Some(7));
        assert!(!reg.is_live(&room("1")));
        assert!(!reg.is_requested(&room("1")));
    }

    #[test]
    fn forget_drops_everything_for_key() {
        let mut reg: Registry<u32> = Registry::new();
        reg.request(&read("4"), handler());
        reg.request(&read("4"), handler());
        reg.set_live(&read("4"), 3);
        assert_eq!(reg.forget(&read("4")), Some(3));
        assert!(reg.handlers(&read("4")).is_empty());
        assert!(!reg.is_requested(&read("4")));
    }

    #[test]
    fn unknown_handler_removal_is_noop() {
        let mut reg: Registry<u32> = Registry::new();
        reg.request(&room("1"), handler());
        assert_eq!(reg.remove_handler(&room("1"), &handler()), None);
        assert_eq!(reg.remove_handler(&room("9"), &handler()), None);
        assert!(reg.is_requested(&room("1")));
    }

    #[test]
    fn duplicate_handler_is_registered_once() {
        let mut reg: Registry<u32> = Registry::new();
        let h = handler();
        reg.request(&room("1"), h.clone());
        reg.request(&room("1"), h.clone());
        assert_eq!(reg.handlers(&room("1")).len(), 1);
        assert_eq!(reg.requested(), vec![room("1")]);
    }

    #[test]
    fn rooms_forget_clears_singleton() {
        let mut reg: Registry<u32> = Registry::new();
        reg.request(&Topic::Rooms, handler());
        reg.set_live(&Topic::Rooms, 1);
        assert_eq!(reg.forget(&Topic::Rooms), Some(1));
        assert!(!reg.is_requested(&Topic::Rooms));
        assert!(!reg.has_handlers(&Topic::Rooms));
    }

    #[test]
    fn clear_resets_all_families() {
        let mut reg: Registry<u32> = Registry::new();
        reg.request(&Topic::Rooms, handler());
        reg.request(&room("1"), handler());
        reg.request(&read("1"), handler());
        reg.request(&Topic::Ping, handler());
        reg.set_live(&room("1"), 1);
        reg.clear();
        assert!(reg.requested().is_empty());
        assert!(reg.live_topics().is_empty());
        assert!(!reg.has_handlers(&Topic::Ping));
        assert!(reg.reconcile().is_empty());
    }
}
