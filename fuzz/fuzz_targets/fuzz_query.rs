// Fuzz target for untrusted backend query payloads.
#![no_main]

use libfuzzer_sys::fuzz_target;
use reach_rules::{from_backend_query, parse_query, AudienceEvaluator};

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    if let Ok(query) = parse_query(&value) {
        let _ = AudienceEvaluator::default().evaluate(&query, &[]);
        let _ = from_backend_query(&query);
    }
});
