//! Fuzz target for search page parsing.
//!
//! Page bodies come straight off the network; parsing must never panic and
//! every parsed hit body must serialize again.

#![no_main]

use libfuzzer_sys::fuzz_target;
use stats_collector::scroll::parse_page;

fuzz_target!(|data: &[u8]| {
    if let Ok(page) = parse_page(data) {
        let _ = page.hits.total.value();
        for hit in &page.hits.hits {
            assert!(serde_json::to_string(&hit.source).is_ok());
        }
    }
});
