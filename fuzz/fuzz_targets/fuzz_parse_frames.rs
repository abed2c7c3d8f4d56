#![no_main]

use chat_socket_client::protocol::parse_frames;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(frames) = parse_frames(text) else {
        return;
    };

    // A decoded frame must re-encode into something that decodes again.
    for frame in frames {
        let again = parse_frames(&frame.encode()).expect("re-encoded frame parses");
        assert_eq!(again.first().map(|f| f.command), Some(frame.command));
    }
});
