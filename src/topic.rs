//! Topic keys and their broker destinations.

use std::fmt;

use crate::protocol::{room_destination, room_read_destination, PING_DESTINATION, ROOMS_DESTINATION};

/// Opaque room identifier echoed by the backend.
///
/// Numeric in practice but compared as a string, so `RoomId::from(7)` and
/// `RoomId::from("7")` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id as the backend's numeric room key, if it is one.
    ///
    /// Integral decimal text such as `"7.0"` or `"7e0"` maps to `7`.
    /// Fractional, non-finite or out-of-range values are `None`.
    pub fn as_number(&self) -> Option<i64> {
        let text = self.0.trim();
        if let Ok(n) = text.parse() {
            return Some(n);
        }
        let n: f64 = text.parse().ok()?;
        let integral = n.is_finite() && n.fract() == 0.0;
        (integral && n.abs() < 9_007_199_254_740_992.0).then_some(n as i64)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for RoomId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for RoomId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<i32> for RoomId {
    fn from(id: i32) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A logical subscription target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Personal room-list feed (singleton).
    Rooms,
    /// Messages for one room.
    Room(RoomId),
    /// Read receipts for one room.
    RoomRead(RoomId),
    /// Liveness pong (singleton).
    Ping,
}

impl Topic {
    /// The topic key: `rooms`, `room:{id}`, `roomRead:{id}` or `ping`.
    pub fn key(&self) -> String {
        match self {
            Topic::Rooms => "rooms".to_string(),
            Topic::Room(id) => format!("room:{id}"),
            Topic::RoomRead(id) => format!("roomRead:{id}"),
            Topic::Ping => "ping".to_string(),
        }
    }

    /// The broker destination this topic subscribes to.
    pub fn destination(&self) -> String {
        match self {
            Topic::Rooms => ROOMS_DESTINATION.to_string(),
            Topic::Room(id) => room_destination(id.as_str()),
            Topic::RoomRead(id) => room_read_destination(id.as_str()),
            Topic::Ping => PING_DESTINATION.to_string(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
