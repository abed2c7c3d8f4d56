#![no_main]

use chat_socket_client::protocol::{ChatMessage, ReadEvent, RoomsEvent};
use chat_socket_client::Payload;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<ChatMessage>(data);

    if let Ok(body) = std::str::from_utf8(data) {
        let payload = Payload::decode(body);
        let _ = payload.parse::<ChatMessage>();
        let _ = payload.parse::<ReadEvent>();
        let _ = payload.parse::<RoomsEvent>();
    }
});
