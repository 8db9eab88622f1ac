use autotel_domain::{sort_json_keys, ConfigManifest};

use crate::error::SigningError;

/// Canonical byte form of a manifest for signing and verification: the JSON
/// serialization with the `signature` field removed, keys sorted
/// lexicographically at every level, no insignificant whitespace, UTF-8.
pub fn canonical_manifest_bytes(manifest: &ConfigManifest) -> Result<Vec<u8>, SigningError> {
    let mut value = serde_json::to_value(manifest)
        .map_err(|e| SigningError::Canonicalization(e.to_string()))?;
    if let Some(obj) = value.as_object_mut() {
        obj.remove("signature");
    }
    let canonical = sort_json_keys(value);
    serde_json::to_vec(&canonical).map_err(|e| SigningError::Canonicalization(e.to_string()))
}
