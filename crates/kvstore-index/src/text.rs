use kvstore_types::Value;

/// Best-effort textual extraction from an opaque value (§4.2 "value
/// interpretation"). If the value parses as JSON, every string leaf is
/// concatenated with a separator; otherwise the raw bytes are treated as
/// text if they are valid UTF-8. Anything else yields an empty string,
/// which tokenizes and n-grams to nothing — the key is still indexed, it
/// simply matches no query.
pub fn extract_text(value: &Value) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(value.as_bytes()) {
        let mut leaves = Vec::new();
        collect_string_leaves(&json, &mut leaves);
        return leaves.join(" ");
    }
    std::str::from_utf8(value.as_bytes())
        .map(str::to_owned)
        .unwrap_or_default()
}

fn collect_string_leaves(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.push(s.clone()),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_string_leaves(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for v in map.values() {
                collect_string_leaves(v, out);
            }
        }
        _ => {}
    }
}

/// Lowercase, split on non-alphanumeric boundaries, drop empty tokens.
/// Applied identically to indexed values and to search queries.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|tok| !tok.is_empty())
        .map(str::to_owned)
        .collect()
}
