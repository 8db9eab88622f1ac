use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of raw bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{:x}", digest)
}

/// Serialize `value` to canonical JSON: object keys sorted lexicographically
/// at every level, no insignificant whitespace, UTF-8. This is the byte form
/// that signatures and drift hashes are computed over.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    let v = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
    let canonical = sort_json_keys(v);
    serde_json::to_vec(&canonical).unwrap_or_default()
}

/// Recursively sort JSON object keys so map field ordering doesn't affect
/// the canonical form.
pub fn sort_json_keys(v: serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, serde_json::Value> =
                map.into_iter().map(|(k, v)| (k, sort_json_keys(v))).collect();
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(sort_json_keys).collect())
        }
        other => other,
    }
}
