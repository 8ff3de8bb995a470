#![no_main]

use auction_sync_client::protocol::ClientMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = serde_json::from_slice::<ClientMessage>(data) {
        // Outbound messages must encode back to the same message.
        let json = serde_json::to_string(&msg).unwrap_or_default();
        let decoded = serde_json::from_str::<ClientMessage>(&json).ok();
        assert_eq!(decoded.as_ref(), Some(&msg));
    }
});
