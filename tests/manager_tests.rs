#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Connection manager tests against the recording mock client.
//!
//! The mock never talks to a network: tests decide when a session is
//! established or lost and which frames arrive, then check what the manager
//! subscribed, published and dispatched.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chat_socket_client::protocol::{
    CHAT_LEAVE_DESTINATION, CHAT_SEND_DESTINATION, PING_DESTINATION, PING_SEND_DESTINATION,
    ROOMS_DESTINATION,
};
use chat_socket_client::{
    ChatMessage, ChatSocketError, ConnectionManager, Handler, Payload, ReadEvent, Subscription,
    Topic,
};

use common::{
    counting_handler, fast_config, recording_handler, ActivateMode, MockClientFactory, TOKEN,
};

const ROOM_7: &str = "/topic/room/7";
const ROOM_7_READ: &str = "/topic/room/7/read";

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn manager_with(mode: ActivateMode) -> (ConnectionManager, Arc<MockClientFactory>) {
    let factory = MockClientFactory::new(mode);
    let manager = ConnectionManager::new(fast_config(), factory.clone());
    (manager, factory)
}

/// A manager whose client connects as soon as it is activated.
fn connected_manager() -> (ConnectionManager, Arc<MockClientFactory>) {
    let (manager, factory) = manager_with(ActivateMode::Immediate);
    assert!(manager.connect(TOKEN, None).is_some());
    assert!(manager.is_connected());
    (manager, factory)
}

fn chat_json(message_id: i64, content: &str) -> String {
    format!(
        r#"{{"messageId":{message_id},"roomId":7,"senderId":3,"content":"{content}","createdAt":"2026-01-01T00:00:00Z"}}"#
    )
}

fn json_body(body: &str) -> serde_json::Value {
    serde_json::from_str(body).expect("published body is JSON")
}

// ════════════════════════════════════════════════════════════════════
// connect / ensure_connected / disconnect
// ════════════════════════════════════════════════════════════════════

#[test]
fn connect_twice_before_completion_creates_one_client() {
    let (manager, factory) = manager_with(ActivateMode::Manual);

    let first = manager.connect(TOKEN, None).unwrap();
    let second = manager.connect(TOKEN, None).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(factory.created(), 1);
    assert_eq!(factory.last().activations(), 1);
    assert_eq!(factory.last().credential, TOKEN);
}

#[test]
fn connect_while_connected_returns_existing_client() {
    let (manager, factory) = connected_manager();
    manager.connect("another-token", None).unwrap();
    assert_eq!(factory.created(), 1);
}

#[test]
fn connect_with_empty_credential_does_nothing() {
    let (manager, factory) = manager_with(ActivateMode::Immediate);
    assert!(manager.connect("", None).is_none());
    assert!(manager.connect("   ", None).is_none());
    assert_eq!(factory.created(), 0);
    assert!(!manager.is_connected());
}

#[test]
fn connect_after_drop_replaces_the_waiting_client() {
    let (manager, factory) = manager_with(ActivateMode::Manual);
    manager.connect(TOKEN, None);
    let first = factory.last();
    first.fire_connect();
    first.fire_close(Some("broker went away"));

    manager.connect("fresh-token", None);

    assert_eq!(factory.created(), 2);
    assert_eq!(first.deactivations(), 1);
    assert_eq!(factory.last().credential, "fresh-token");
}

#[test]
fn events_from_a_retired_client_are_ignored() {
    let (manager, factory) = manager_with(ActivateMode::Manual);
    let (handler, _) = counting_handler();
    manager.subscribe_room(7, handler);

    manager.connect(TOKEN, None);
    let retired = factory.last();
    retired.fire_close(None);
    manager.connect(TOKEN, None);

    // The retired client reconnecting on its own must not pick up topics.
    retired.fire_connect();
    assert_eq!(retired.subscribe_calls(ROOM_7), 0);
    assert!(manager.live_topics().is_empty());

    factory.last().fire_connect();
    assert_eq!(factory.last().active_subscriptions(ROOM_7), 1);
}

#[tokio::test]
async fn ensure_connected_waits_for_the_session() {
    let (manager, factory) = manager_with(ActivateMode::After(Duration::from_millis(20)));

    let client = tokio_test::assert_ok!(manager.ensure_connected(TOKEN, None).await);

    assert!(client.is_connected());
    assert_eq!(factory.created(), 1);
}

#[tokio::test]
async fn ensure_connected_returns_immediately_when_connected() {
    let (manager, factory) = connected_manager();
    tokio_test::assert_ok!(manager.ensure_connected(TOKEN, None).await);
    assert_eq!(factory.created(), 1);
}

#[tokio::test]
async fn concurrent_ensure_connected_share_one_attempt() {
    let (manager, factory) = manager_with(ActivateMode::After(Duration::from_millis(30)));

    let (a, b, c) = tokio::join!(
        manager.ensure_connected(TOKEN, None),
        manager.ensure_connected(TOKEN, None),
        manager.ensure_connected(TOKEN, None),
    );

    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&b, &c));
    assert_eq!(factory.created(), 1);
    assert_eq!(factory.last().activations(), 1);
}

#[tokio::test]
async fn ensure_connected_times_out() {
    let (manager, _factory) = manager_with(ActivateMode::Manual);

    let started = tokio::time::Instant::now();
    let err = manager.ensure_connected(TOKEN, None).await.err().unwrap();

    assert!(matches!(err, ChatSocketError::ConnectTimeout));
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn ensure_connected_can_retry_after_timeout() {
    let (manager, factory) = manager_with(ActivateMode::Manual);
    assert!(manager.ensure_connected(TOKEN, None).await.is_err());

    let client = factory.last();
    let retry = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.ensure_connected(TOKEN, None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.fire_connect();

    assert!(retry.await.unwrap().is_ok());
}

#[tokio::test]
async fn ensure_connected_after_cancelled_wait_expires_waits_again() {
    let (manager, factory) = manager_with(ActivateMode::Manual);

    let cancelled =
        tokio::time::timeout(Duration::from_millis(20), manager.ensure_connected(TOKEN, None))
            .await;
    assert!(cancelled.is_err());

    // Past the abandoned wait's deadline.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let started = tokio::time::Instant::now();
    let retry = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.ensure_connected(TOKEN, None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    factory.last().fire_connect();

    assert!(retry.await.unwrap().is_ok());
    assert!(started.elapsed() >= Duration::from_millis(20));
    assert_eq!(factory.created(), 1);
}

#[tokio::test]
async fn cancelled_caller_leaves_a_live_wait_for_others() {
    let (manager, factory) = manager_with(ActivateMode::Manual);

    let cancelled =
        tokio::time::timeout(Duration::from_millis(20), manager.ensure_connected(TOKEN, None))
            .await;
    assert!(cancelled.is_err());

    let joined = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.ensure_connected(TOKEN, None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    factory.last().fire_connect();

    assert!(joined.await.unwrap().is_ok());
    assert_eq!(factory.created(), 1);
}

#[tokio::test]
async fn ensure_connected_rejects_missing_credential() {
    let (manager, factory) = manager_with(ActivateMode::Immediate);
    let err = manager.ensure_connected("", None).await.err().unwrap();
    assert!(matches!(err, ChatSocketError::AuthRequired));
    assert_eq!(factory.created(), 0);
}

#[test]
fn disconnect_deactivates_and_forgets_everything() {
    let (manager, factory) = connected_manager();
    let (h, _) = counting_handler();
    let (h2, _) = counting_handler();
    manager.subscribe_room(7, h);
    manager.subscribe_rooms(h2);
    let client = factory.last();

    manager.disconnect();

    assert_eq!(client.deactivations(), 1);
    assert!(!manager.is_connected());
    assert!(manager.live_topics().is_empty());
    assert!(manager.requested_topics().is_empty());
    assert!(client.subscriptions().iter().all(|s| s.unsubscribe_calls() == 1));
}

#[test]
fn disconnect_without_client_is_harmless() {
    let (manager, factory) = manager_with(ActivateMode::Manual);
    manager.disconnect();
    manager.disconnect();
    assert_eq!(factory.created(), 0);
}

#[test]
fn full_disconnect_then_reconnect_has_no_live_subscriptions() {
    let (manager, factory) = connected_manager();
    let (h, _) = counting_handler();
    let (h2, _) = counting_handler();
    manager.subscribe_room(7, h);
    manager.subscribe_rooms(h2);
    assert_eq!(manager.live_topics().len(), 2);

    manager.disconnect();
    manager.connect(TOKEN, None);

    let fresh = factory.last();
    assert_eq!(factory.created(), 2);
    assert!(manager.is_connected());
    assert!(fresh.subscribe_log().is_empty());
    assert!(manager.live_topics().is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Subscribe / unsubscribe
// ════════════════════════════════════════════════════════════════════

#[test]
fn repeated_subscribe_room_keeps_one_live_subscription() {
    let (manager, factory) = connected_manager();
    let (handler, count) = counting_handler();

    let first = manager.subscribe_room(7, handler.clone()).unwrap();
    for _ in 0..4 {
        let again = manager.subscribe_room(7, handler.clone()).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }

    let client = factory.last();
    assert_eq!(client.subscribe_calls(ROOM_7), 1);
    assert_eq!(client.deliver(ROOM_7, &chat_json(1, "hi")), 1);
    // The same handler registered five times still runs once per frame.
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn failing_handler_does_not_block_siblings() {
    let (manager, factory) = connected_manager();
    let failing = Handler::new(|_| Err("render failed".into()));
    let panicking = Handler::from_fn(|_| panic!("handler bug"));
    let (healthy, count) = counting_handler();

    manager.subscribe_room(7, failing);
    manager.subscribe_room(7, panicking);
    manager.subscribe_room(7, healthy);

    let client = factory.last();
    for id in 0..3 {
        client.deliver(ROOM_7, &chat_json(id, "x"));
    }
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[test]
fn deferred_subscribe_resolves_on_connect() {
    let (manager, factory) = manager_with(ActivateMode::Manual);
    let (handler, seen) = recording_handler();

    assert!(manager.subscribe_room(7, handler).is_none());
    assert_eq!(manager.requested_topics(), vec![Topic::Room(7.into())]);
    assert!(manager.live_topics().is_empty());

    manager.connect(TOKEN, None);
    let client = factory.last();
    assert!(client.subscribe_log().is_empty());
    client.fire_connect();

    assert_eq!(client.active_subscriptions(ROOM_7), 1);
    assert_eq!(manager.live_topics(), vec![Topic::Room(7.into())]);

    for (id, text) in [(1, "one"), (2, "two"), (3, "three")] {
        client.deliver(ROOM_7, &chat_json(id, text));
    }
    let contents: Vec<String> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|p| p.parse::<ChatMessage>().unwrap().content)
        .collect();
    assert_eq!(contents, ["one", "two", "three"]);
}

#[test]
fn failed_unsubscribe_on_close_does_not_stop_cleanup() {
    let (manager, factory) = connected_manager();
    let (h_rooms, _) = counting_handler();
    let (h7, count7) = counting_handler();
    let (h_read, _) = counting_handler();
    manager.subscribe_rooms(h_rooms);
    manager.subscribe_room(7, h7);
    manager.subscribe_room_read(7, h_read);

    let client = factory.last();
    let handles = client.active();
    assert_eq!(handles.len(), 3);
    handles
        .iter()
        .find(|s| s.destination() == ROOM_7)
        .unwrap()
        .fail_unsubscribe();

    client.fire_close(Some("network"));

    for handle in &handles {
        assert_eq!(handle.unsubscribe_calls(), 1, "{}", handle.destination());
    }
    assert!(manager.live_topics().is_empty());
    assert_eq!(manager.requested_topics().len(), 3);

    client.fire_connect();

    assert_eq!(
        client.active_destinations(),
        vec![ROOMS_DESTINATION, ROOM_7, ROOM_7_READ]
    );
    assert_eq!(manager.live_topics().len(), 3);
    assert_eq!(client.deliver(ROOM_7, &chat_json(1, "again")), 1);
    assert_eq!(count7.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_unsubscribe_on_disconnect_does_not_stop_cleanup() {
    let (manager, factory) = connected_manager();
    let (h_rooms, _) = counting_handler();
    let (h7, _) = counting_handler();
    let (h_read, _) = counting_handler();
    manager.subscribe_rooms(h_rooms);
    manager.subscribe_room(7, h7);
    manager.subscribe_room_read(7, h_read);

    let client = factory.last();
    let handles = client.active();
    handles[0].fail_unsubscribe();

    manager.disconnect();

    for handle in &handles {
        assert_eq!(handle.unsubscribe_calls(), 1, "{}", handle.destination());
    }
    assert!(manager.live_topics().is_empty());
    assert!(manager.requested_topics().is_empty());
    assert_eq!(client.deactivations(), 1);
}

#[test]
fn reconnect_restores_requested_topics() {
    let (manager, factory) = manager_with(ActivateMode::Manual);
    let (h_rooms, rooms_count) = counting_handler();
    let (h7, count7) = counting_handler();
    let (h8, _) = counting_handler();
    let (h_read, read_count) = counting_handler();

    manager.connect(TOKEN, None);
    let client = factory.last();
    client.fire_connect();
    manager.subscribe_rooms(h_rooms);
    manager.subscribe_room(7, h7);
    manager.subscribe_room(8, h8.clone());
    manager.subscribe_room_read(7, h_read);

    client.fire_close(Some("network"));
    assert!(manager.live_topics().is_empty());
    assert_eq!(manager.requested_topics().len(), 4);

    // Every handler for room 8 goes away while disconnected.
    manager.unsubscribe_room(8, Some(&h8));

    client.fire_connect();

    assert_eq!(
        manager.live_topics(),
        vec![
            Topic::Rooms,
            Topic::Room(7.into()),
            Topic::RoomRead(7.into()),
        ]
    );
    assert_eq!(client.active_subscriptions(ROOMS_DESTINATION), 1);
    assert_eq!(client.active_subscriptions(ROOM_7), 1);
    assert_eq!(client.active_subscriptions(ROOM_7_READ), 1);
    assert_eq!(client.subscribe_calls("/topic/room/8"), 1);

    client.deliver(ROOMS_DESTINATION, r#"{"type":"ROOMS_CHANGED"}"#);
    client.deliver(ROOM_7, &chat_json(9, "back"));
    client.deliver(ROOM_7_READ, r#"{"type":"READ","roomId":7,"userId":3,"lastReadMessageId":9}"#);
    assert_eq!(rooms_count.load(Ordering::SeqCst), 1);
    assert_eq!(count7.load(Ordering::SeqCst), 1);
    assert_eq!(read_count.load(Ordering::SeqCst), 1);
}

#[test]
fn repeated_connect_events_never_duplicate_subscriptions() {
    let (manager, factory) = manager_with(ActivateMode::Manual);
    let (h, _) = counting_handler();
    manager.subscribe_room(7, h);
    manager.connect(TOKEN, None);
    let client = factory.last();

    client.fire_connect();
    client.fire_connect();
    assert_eq!(client.subscribe_calls(ROOM_7), 1);

    client.fire_close(None);
    client.fire_connect();
    assert_eq!(client.active_subscriptions(ROOM_7), 1);
    assert_eq!(client.subscribe_calls(ROOM_7), 2);
}

#[test]
fn resubscribe_runs_in_family_order() {
    let (manager, factory) = manager_with(ActivateMode::Manual);
    let (h, _) = counting_handler();
    manager.subscribe_room_read(3, h.clone());
    manager.subscribe_room(5, h.clone());
    manager.subscribe_rooms(h.clone());
    manager.subscribe_room(2, h.clone());

    let (ping, _) = counting_handler();
    manager.connect(TOKEN, Some(ping));
    let client = factory.last();
    client.fire_connect();

    assert_eq!(
        client.subscribe_log(),
        [
            ROOMS_DESTINATION,
            "/topic/room/5",
            "/topic/room/2",
            "/topic/room/3/read",
            PING_DESTINATION,
        ]
    );
}

#[test]
fn partial_then_full_unsubscribe() {
    let (manager, factory) = connected_manager();
    let (h1, count1) = counting_handler();
    let (h2, count2) = counting_handler();
    manager.subscribe_room(7, h1.clone());
    manager.subscribe_room(7, h2.clone());
    let client = factory.last();

    manager.unsubscribe_room(7, Some(&h1));
    assert_eq!(client.active_subscriptions(ROOM_7), 1);
    client.deliver(ROOM_7, &chat_json(1, "still here"));
    assert_eq!(count1.load(Ordering::SeqCst), 0);
    assert_eq!(count2.load(Ordering::SeqCst), 1);

    manager.unsubscribe_room(7, Some(&h2));
    assert_eq!(client.active_subscriptions(ROOM_7), 0);
    assert!(manager.requested_topics().is_empty());
    assert!(manager.live_topics().is_empty());

    // Gone for good: a reconnect does not bring it back.
    client.fire_close(None);
    client.fire_connect();
    assert_eq!(client.subscribe_calls(ROOM_7), 1);
}

#[test]
fn unsubscribe_room_without_handler_drops_all() {
    let (manager, factory) = connected_manager();
    let (h1, _) = counting_handler();
    let (h2, _) = counting_handler();
    manager.subscribe_room_read(7, h1);
    manager.subscribe_room_read(7, h2);

    manager.unsubscribe_room_read(7, None);

    let client = factory.last();
    assert_eq!(client.active_subscriptions(ROOM_7_READ), 0);
    assert!(manager.requested_topics().is_empty());
}

#[test]
fn unsubscribe_with_unknown_handler_keeps_subscription() {
    let (manager, factory) = connected_manager();
    let (h, count) = counting_handler();
    let (stranger, _) = counting_handler();
    manager.subscribe_room(7, h);

    manager.unsubscribe_room(7, Some(&stranger));
    manager.unsubscribe_room(99, Some(&stranger));

    let client = factory.last();
    assert_eq!(client.active_subscriptions(ROOM_7), 1);
    client.deliver(ROOM_7, &chat_json(1, "hi"));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn unsubscribe_rooms_clears_the_feed() {
    let (manager, factory) = connected_manager();
    let (h1, _) = counting_handler();
    let (h2, _) = counting_handler();
    manager.subscribe_rooms(h1);
    manager.subscribe_rooms(h2);
    let client = factory.last();
    assert_eq!(client.subscribe_calls(ROOMS_DESTINATION), 1);

    manager.unsubscribe_rooms();

    assert_eq!(client.active_subscriptions(ROOMS_DESTINATION), 0);
    assert_eq!(client.deliver(ROOMS_DESTINATION, "{}"), 0);
    assert!(manager.requested_topics().is_empty());
}

#[test]
fn rooms_and_reads_are_independent_topics() {
    let (manager, factory) = connected_manager();
    let (h_msg, msg_seen) = recording_handler();
    let (h_read, read_seen) = recording_handler();
    manager.subscribe_room(7, h_msg);
    manager.subscribe_room_read(7, h_read);
    let client = factory.last();

    client.deliver(ROOM_7_READ, r#"{"type":"READ","roomId":7,"userId":4}"#);

    assert!(msg_seen.lock().unwrap().is_empty());
    let read = read_seen.lock().unwrap()[0].parse::<ReadEvent>().unwrap();
    assert_eq!(read.user_id, 4);
    assert_eq!(read.last_read_message_id, None);
}

#[test]
fn handler_may_unsubscribe_itself_during_dispatch() {
    let (manager, factory) = connected_manager();
    let (other, other_count) = counting_handler();
    let inner = manager.clone();
    let once = Handler::from_fn(move |_| inner.unsubscribe_room(7, None));
    manager.subscribe_room(7, once);
    manager.subscribe_room(7, other);
    let client = factory.last();

    client.deliver(ROOM_7, &chat_json(1, "bye"));

    // The snapshot taken before dispatch still reaches the sibling.
    assert_eq!(other_count.load(Ordering::SeqCst), 1);
    assert_eq!(client.active_subscriptions(ROOM_7), 0);
    assert!(manager.requested_topics().is_empty());
}

#[test]
fn non_json_frames_are_delivered_raw() {
    let (manager, factory) = connected_manager();
    let (h, seen) = recording_handler();
    manager.subscribe_room(7, h);

    factory.last().deliver(ROOM_7, "not json");

    assert_eq!(seen.lock().unwrap()[0], Payload::Raw("not json".into()));
}

#[test]
fn protocol_errors_leave_subscriptions_alone() {
    let (manager, factory) = connected_manager();
    let (h, _) = counting_handler();
    manager.subscribe_room(7, h);

    factory.last().fire_protocol_error("bad destination");

    assert_eq!(manager.live_topics(), vec![Topic::Room(7.into())]);
}

// ════════════════════════════════════════════════════════════════════
// Ping
// ════════════════════════════════════════════════════════════════════

#[test]
fn ping_handler_is_subscribed_and_pinged_on_connect() {
    let (manager, factory) = manager_with(ActivateMode::Manual);
    let (on_ping, seen) = recording_handler();
    manager.connect(TOKEN, Some(on_ping));
    let client = factory.last();

    client.fire_connect();

    assert_eq!(client.active_subscriptions(PING_DESTINATION), 1);
    assert_eq!(client.published(), [(PING_SEND_DESTINATION.to_string(), String::new())]);

    client.deliver(PING_DESTINATION, "pong");
    assert_eq!(seen.lock().unwrap()[0], Payload::Raw("pong".into()));
}

#[test]
fn ping_resubscribes_after_reconnect() {
    let (manager, factory) = manager_with(ActivateMode::Manual);
    let (on_ping, _) = counting_handler();
    manager.connect(TOKEN, Some(on_ping));
    let client = factory.last();

    client.fire_connect();
    client.fire_close(None);
    client.fire_connect();

    assert_eq!(client.subscribe_calls(PING_DESTINATION), 2);
    assert_eq!(client.active_subscriptions(PING_DESTINATION), 1);
    assert_eq!(client.published().len(), 2);
}

#[test]
fn manual_ping_publishes_when_connected() {
    let (manager, factory) = connected_manager();
    assert!(manager.ping());
    assert_eq!(
        factory.last().published(),
        [(PING_SEND_DESTINATION.to_string(), String::new())]
    );

    let (offline, _) = manager_with(ActivateMode::Manual);
    assert!(!offline.ping());
}

// ════════════════════════════════════════════════════════════════════
// Send
// ════════════════════════════════════════════════════════════════════

#[test]
fn send_rejects_blank_text() {
    let (manager, factory) = connected_manager();
    assert!(!manager.send_message(7, ""));
    assert!(!manager.send_message(7, "   "));
    assert!(factory.last().published().is_empty());
}

#[test]
fn send_while_disconnected_is_rejected() {
    let (manager, factory) = manager_with(ActivateMode::Manual);
    assert!(!manager.send_message(7, "hi"));

    manager.connect(TOKEN, None);
    assert!(!manager.send_message(7, "hi"));
    assert!(factory.last().published().is_empty());
}

#[test]
fn send_publishes_one_trimmed_message() {
    let (manager, factory) = connected_manager();

    assert!(manager.send_message(7, "  hi  "));

    let published = factory.last().published();
    assert_eq!(published.len(), 1);
    let (destination, body) = &published[0];
    assert_eq!(destination, CHAT_SEND_DESTINATION);
    assert_eq!(
        json_body(body),
        serde_json::json!({ "roomId": 7, "content": "hi" })
    );
}

#[test]
fn send_accepts_numeric_string_room_ids() {
    let (manager, factory) = connected_manager();
    assert!(manager.send_message("42", "hello"));
    assert!(!manager.send_message("lobby", "hello"));

    let published = factory.last().published();
    assert_eq!(published.len(), 1);
    assert_eq!(json_body(&published[0].1)["roomId"], 42);
}

#[test]
fn leave_room_publishes_request() {
    let (manager, factory) = connected_manager();

    assert!(manager.leave_room(7));
    assert!(!manager.leave_room("not-a-number"));

    let published = factory.last().published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, CHAT_LEAVE_DESTINATION);
    assert_eq!(json_body(&published[0].1), serde_json::json!({ "roomId": 7 }));
}

#[test]
fn send_after_drop_is_rejected_until_reconnect() {
    let (manager, factory) = connected_manager();
    let client = factory.last();

    client.fire_close(None);
    assert!(!manager.send_message(7, "lost"));

    client.fire_connect();
    assert!(manager.send_message(7, "back"));
    assert_eq!(client.published().len(), 1);
}
