// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Fuzz target for filter matching.
// Run with: cargo +nightly fuzz run fuzz_matcher
//
// Input is read as a JSON array `[document, filter]`. Matching must never
// panic, and loose equality must be symmetric for every pair of values.

#![no_main]

use libfuzzer_sys::fuzz_target;
use promised_store::{has_attributes, loose_eq, matches};
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    if data.len() > 4096 {
        return;
    }
    let Ok(Value::Array(items)) = serde_json::from_slice::<Value>(data) else {
        return;
    };
    let (Some(Value::Object(document)), Some(Value::Object(filter))) = (items.first(), items.get(1)) else {
        return;
    };

    let strict = has_attributes(document, filter);
    let selected = matches(document, filter);
    assert!(!strict || selected);
    if filter.is_empty() {
        assert!(selected && !strict);
    }

    for a in document.values() {
        for b in filter.values() {
            assert_eq!(loose_eq(a, b), loose_eq(b, a));
        }
    }
});
