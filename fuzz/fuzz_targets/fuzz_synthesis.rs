// Fuzz target feeding arbitrary generator output to the rules parser.
#![no_main]

use libfuzzer_sys::fuzz_target;
use reach_rules::{translate, ModelSchema, SynthesisSchema, TranslationMode};
use reach_synth::parse_rules_response;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(tree) = parse_rules_response(text) {
        // Anything accepted must also satisfy the stricter structural checks.
        assert!(ModelSchema.validate(&tree).is_ok());
        let value = serde_json::to_value(&tree).expect("serialize tree");
        assert!(SynthesisSchema.validate_value(&value).is_ok());
        let _ = translate(&tree, TranslationMode::Flatten);
    }
});
