#![no_main]

use libfuzzer_sys::fuzz_target;
use roomcast_client::protocol::classify;
use roomcast_client::{BincodeCodec, FrameCodec};

fuzz_target!(|data: &[u8]| {
    // Exercise the full inbound path: raw bytes through the default codec
    // and, when that yields a frame, through classification. Neither stage
    // may panic on arbitrary input.
    if let Ok(frame) = BincodeCodec.decode(data) {
        let _ = classify(frame);
    }
});
