//! Fuzz target for the wire-to-store document conversion.
//!
//! Reverse imports feed arbitrary search store bodies into the store form.
//! Conversion must never panic, and converting back must keep every key.

#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use stats_collector::codec::{document_to_wire, wire_to_document};

fuzz_target!(|data: &[u8]| {
    let Ok(Value::Object(body)) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    if let Ok(doc) = wire_to_document(&body) {
        let back = document_to_wire(doc);
        for key in body.keys() {
            assert!(back.contains_key(key), "lost key {key:?}");
        }
    }
});
