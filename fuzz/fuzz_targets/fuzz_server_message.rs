#![no_main]

use auction_sync_client::protocol::ServerMessage;
use auction_sync_client::ConnectionEvent;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        let _ = serde_json::from_slice::<ServerMessage>(data);
        return;
    };

    // Frames arrive as text; anything that decodes must survive a re-encode
    // and reach sessions as an event.
    if let Ok(msg) = serde_json::from_str::<ServerMessage>(text) {
        let _ = msg.event_name();
        let _ = serde_json::to_string(&msg);
        let _ = ConnectionEvent::from(msg);
    }
});
