//! Recovers a JSON object from free-form generator output.

use serde_json::Value;

use crate::error::SynthesisError;

/// Returns the first balanced `{ ... }` span that parses as a JSON object.
///
/// Braces inside string literals are ignored while balancing, so values such
/// as `"{name}"` do not confuse the scan.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        let Some(end) = balanced_end(&text[start..]) else {
            search_from = start + 1;
            continue;
        };
        let candidate = &text[start..start + end];
        if matches!(serde_json::from_str::<Value>(candidate), Ok(Value::Object(_))) {
            return Some(candidate);
        }
        search_from = start + 1;
    }
    None
}

// Byte length of the brace-balanced prefix of `text`, which starts with `{`.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(index + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses generator output: the embedded object if there is one, otherwise
/// the whole text.
pub fn parse_generated_json(text: &str) -> Result<Value, SynthesisError> {
    let candidate = extract_json_object(text).unwrap_or(text.trim());
    serde_json::from_str(candidate).map_err(|err| SynthesisError::Structure(err.to_string()))
}
