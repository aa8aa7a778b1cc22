//! Canonical JSON rendering.
//!
//! Contract box ids and some `message_to_sign` payloads are derived from
//! the bytes of a JSON value, so the same logical value must always
//! serialize to the same bytes. `serde_json::to_vec` alone isn't enough:
//! object key order is whatever the caller inserted, and `serde_json`'s
//! `Map` defaults to preserving insertion order unless the `preserve_order`
//! feature is off. This module pins both key order (sorted, byte-ascending)
//! and whitespace (none) regardless of that feature flag.

use serde_json::Value;

/// Renders `value` as canonical JSON bytes: object keys sorted in
/// byte-ascending order, no insignificant whitespace, numbers rendered
/// via `serde_json`'s default (shortest round-trippable) formatting.
pub fn canonical_json_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

/// Convenience wrapper returning a `String` instead of raw bytes.
pub fn canonical_json_string(value: &Value) -> String {
    String::from_utf8(canonical_json_bytes(value)).expect("canonical JSON is always valid UTF-8")
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => {
            let encoded = serde_json::to_string(s).expect("string always encodes");
            out.extend_from_slice(encoded.as_bytes());
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                let encoded_key = serde_json::to_string(k).expect("key always encodes");
                out.extend_from_slice(encoded_key.as_bytes());
                out.push(b':');
                write_canonical(&map[k], out);
            }
            out.push(b'}');
        }
    }
}
