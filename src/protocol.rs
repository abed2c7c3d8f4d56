//! Wire-level types for the chat broker.
//!
//! Two layers live here:
//!
//! - the STOMP 1.2 text frame ([`Frame`]) with its encoder and
//!   [`parse_frames`] decoder, and
//! - the JSON bodies the broker exchanges on the chat destinations
//!   ([`ChatMessage`], [`ReadEvent`], [`RoomsEvent`], [`SendMessageRequest`],
//!   [`LeaveRoomRequest`]).
//!
//! Destination names are part of the contract with the backend and are
//! reproduced exactly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ChatSocketError, Result};

// ── Destinations ────────────────────────────────────────────────────

/// Personal room-list feed (inbound).
pub const ROOMS_DESTINATION: &str = "/user/queue/rooms";

/// Liveness pong (inbound).
pub const PING_DESTINATION: &str = "/user/queue/ping";

/// Liveness ping (outbound, empty body).
pub const PING_SEND_DESTINATION: &str = "/app/ping";

/// Chat message send (outbound).
pub const CHAT_SEND_DESTINATION: &str = "/app/chat/send";

/// Leave a room (outbound).
pub const CHAT_LEAVE_DESTINATION: &str = "/app/chat/leave";

/// Per-room message topic, `/topic/room/{roomId}`.
pub fn room_destination(room_id: &str) -> String {
    format!("/topic/room/{room_id}")
}

/// Per-room read-receipt topic, `/topic/room/{roomId}/read`.
pub fn room_read_destination(room_id: &str) -> String {
    format!("/topic/room/{room_id}/read")
}

// ── Frames ──────────────────────────────────────────────────────────

/// STOMP commands this client sends or understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// The command line as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// Recognize a command line. Returns `None` for anything unknown.
    pub fn parse(line: &str) -> Option<Self> {
        Some(match line {
            "CONNECT" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            _ => return None,
        })
    }

    /// `CONNECT` and `CONNECTED` frames carry headers verbatim.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One STOMP frame.
///
/// Headers keep their wire order. When a header repeats, [`Frame::header`]
/// returns the first occurrence, as STOMP 1.2 requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header called `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Build the `CONNECT` frame that opens a session.
    pub fn connect(host: &str, credential: &str) -> Self {
        Frame::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", "0,0")
            .with_header("Authorization", format!("Bearer {credential}"))
    }

    /// Build a `SUBSCRIBE` frame.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    /// Build an `UNSUBSCRIBE` frame.
    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).with_header("id", id)
    }

    /// Build a `SEND` frame carrying a JSON body.
    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        let mut frame = Frame::new(Command::Send).with_header("destination", destination);
        if !body.is_empty() {
            frame = frame
                .with_header("content-type", "application/json")
                .with_header("content-length", body.len().to_string());
        }
        frame.with_body(body)
    }

    /// Encode to the STOMP text representation, NUL-terminated.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Parse every frame contained in one transport message.
///
/// Frames are NUL-terminated; a trailing frame without the terminator is
/// accepted. Bare EOLs between frames are heart-beats and are skipped, so a
/// heart-beat-only message yields an empty vector.
///
/// # Errors
///
/// Returns [`ChatSocketError::MalformedFrame`] for an unknown command or a
/// header line without `:`.
pub fn parse_frames(text: &str) -> Result<Vec<Frame>> {
    let mut frames = Vec::new();
    for chunk in text.split('\0') {
        let chunk = chunk.trim_start_matches(['\r', '\n']);
        if chunk.is_empty() {
            continue;
        }
        frames.push(parse_frame(chunk)?);
    }
    Ok(frames)
}

fn parse_frame(chunk: &str) -> Result<Frame> {
    let (head, body) = split_head(chunk);
    let mut lines = head.lines();
    let command_line = lines.next().unwrap_or_default().trim_end_matches('\r');
    let command = Command::parse(command_line)
        .ok_or_else(|| ChatSocketError::MalformedFrame(format!("unknown command {command_line:?}")))?;

    let mut headers = Vec::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ChatSocketError::MalformedFrame(format!("bad header line {line:?}")))?;
        if command.escapes_headers() {
            headers.push((unescape_header(name), unescape_header(value)));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    Ok(Frame {
        command,
        headers,
        body: body.to_string(),
    })
}

/// Split at the blank line ending the header block, tolerating `\r\n`.
fn split_head(chunk: &str) -> (&str, &str) {
    let lf = chunk.find("\n\n").map(|i| (i, 2));
    let crlf = chunk.find("\r\n\r\n").map(|i| (i, 4));
    let split = match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };
    match split {
        Some((at, len)) => (
            chunk.get(..at).unwrap_or_default(),
            chunk.get(at + len..).unwrap_or_default(),
        ),
        None => (chunk, ""),
    }
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

// ── JSON bodies ─────────────────────────────────────────────────────

/// Body published to [`CHAT_SEND_DESTINATION`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub room_id: i64,
    pub content: String,
}

/// Body published to [`CHAT_LEAVE_DESTINATION`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomRequest {
    pub room_id: i64,
}

/// Attachment metadata carried by a chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub attachment_id: i64,
    pub original_name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
}

/// A chat message broadcast on `/topic/room/{roomId}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub message_id: i64,
    pub room_id: i64,
    pub sender_id: i64,
    #[serde(default)]
    pub content: String,
    /// ISO 8601 timestamp.
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A read receipt broadcast on `/topic/room/{roomId}/read`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadEvent {
    /// Always `"READ"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub room_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub last_read_message_id: Option<i64>,
}

/// A room-list change notification on `/user/queue/rooms`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomsEvent {
    /// `"ROOMS_CHANGED"` for every event the backend currently emits.
    #[serde(rename = "type")]
    pub kind: String,
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

    #[test]
    fn connect_frame_carries_bearer_header_unescaped() {
        let text = Frame::connect("localhost", "tok:en").encode();
        assert!(text.starts_with("CONNECT\n"));
        assert!(text.contains("Authorization:Bearer tok:en\n"));
        assert!(text.contains("accept-version:1.2\n"));
        assert!(text.ends_with("\n\n\0"));
    }

    #[test]
    fn send_frame_sets_length_and_type() {
        let frame = Frame::send(CHAT_SEND_DESTINATION, r#"{"roomId":1,"content":"hi"}"#);
        assert_eq!(frame.header("destination"), Some("/app/chat/send"));
        assert_eq!(frame.header("content-type"), Some("application/json"));
        assert_eq!(frame.header("content-length"), Some("27"));
    }

    #[test]
    fn empty_send_has_no_content_headers() {
        let frame = Frame::send(PING_SEND_DESTINATION, "");
        assert_eq!(frame.header("content-length"), None);
        assert_eq!(frame.encode(), "SEND\ndestination:/app/ping\n\n\0");
    }

    #[test]
    fn parse_message_frame() {
        let text = "MESSAGE\ndestination:/topic/room/7\nsubscription:sub-0\nmessage-id:1\n\n{\"a\":1}\0";
        let frames = parse_frames(text).unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("subscription"), Some("sub-0"));
        assert_eq!(frame.body, "{\"a\":1}");
    }

    #[test]
    fn parse_accepts_crlf() {
        let text = "CONNECTED\r\nversion:1.2\r\n\r\n\0";
        let frames = parse_frames(text).unwrap();
        assert_eq!(frames[0].command, Command::Connected);
        assert_eq!(frames[0].header("version"), Some("1.2"));
        assert!(frames[0].body.is_empty());
    }

    #[test]
    fn heartbeat_only_yields_nothing() {
        assert!(parse_frames("\n").unwrap().is_empty());
        assert!(parse_frames("\r\n\n").unwrap().is_empty());
    }

    #[test]
    fn multiple_frames_in_one_message() {
        let text = "RECEIPT\nreceipt-id:1\n\n\0\nMESSAGE\nsubscription:sub-1\n\nx\0";
        let frames = parse_frames(text).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, Command::Receipt);
        assert_eq!(frames[1].body, "x");
    }

    #[test]
    fn repeated_header_keeps_first() {
        let text = "MESSAGE\nfoo:first\nfoo:second\n\n\0";
        let frames = parse_frames(text).unwrap();
        assert_eq!(frames[0].header("foo"), Some("first"));
    }

    #[test]
    fn header_escapes_are_decoded() {
        let text = "ERROR\nmessage:bad\\cthing\\nhere\n\nbody\0";
        let frames = parse_frames(text).unwrap();
        assert_eq!(frames[0].header("message"), Some("bad:thing\nhere"));
    }

    #[test]
    fn subscribe_frame_escapes_colons() {
        let text = Frame::subscribe("sub-0", "/a:b").encode();
        assert!(text.contains("destination:/a\\cb\n"));
        let back = parse_frames(&text).unwrap();
        assert_eq!(back[0].header("destination"), Some("/a:b"));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let err = parse_frames("BOGUS\n\n\0").unwrap_err();
        assert!(matches!(err, ChatSocketError::MalformedFrame(_)));
    }

    #[test]
    fn header_without_colon_is_rejected() {
        let err = parse_frames("MESSAGE\nnocolon\n\n\0").unwrap_err();
        assert!(matches!(err, ChatSocketError::MalformedFrame(_)));
    }

    #[test]
    fn send_request_uses_camel_case() {
        let json = serde_json::to_string(&SendMessageRequest {
            room_id: 12,
            content: "hi".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"roomId":12,"content":"hi"}"#);
    }

    #[test]
    fn chat_message_tolerates_missing_optionals() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"messageId":1,"roomId":2,"senderId":3,"content":"yo"}"#)
                .unwrap();
        assert_eq!(msg.room_id, 2);
        assert!(msg.attachments.is_empty());
        assert!(msg.created_at.is_none());
    }

    #[test]
    fn read_event_decodes_backend_shape() {
        let ev: ReadEvent = serde_json::from_str(
            r#"{"type":"READ","roomId":5,"userId":9,"lastReadMessageId":null}"#,
        )
        .unwrap();
        assert_eq!(ev.kind, "READ");
        assert_eq!(ev.user_id, 9);
        assert_eq!(ev.last_read_message_id, None);
    }

    #[test]
    fn destinations_match_backend_routes() {
        assert_eq!(room_destination("42"), "/topic/room/42");
        assert_eq!(room_read_destination("42"), "/topic/room/42/read");
    }
}
