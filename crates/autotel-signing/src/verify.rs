use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use tracing::{debug, warn};

use autotel_domain::ConfigManifest;

use crate::canonical::canonical_manifest_bytes;
use crate::error::SigningError;

/// Trusted manifest-signing public keys compiled into the binary, SEC1
/// encoded and base64 wrapped, tried in declared order. Release builds
/// replace this set at build time; revocation ships a new binary.
pub const EMBEDDED_TRUSTED_KEYS: &[&str] =
    &["BG/wO5SSQc4drdQ1GeaWDgqFtBppoFwygQOqK84VlMoWPE91OlW/AdxT9sCwx+7ni0DG/30lqW4igrmJzvccFEo="];

/// Ordered set of trusted verification keys.
#[derive(Debug, Clone)]
pub struct KeyRing {
    keys: Vec<VerifyingKey>,
}

impl KeyRing {
    pub fn new(keys: Vec<VerifyingKey>) -> Self {
        KeyRing { keys }
    }

    /// The compiled-in trusted key set.
    pub fn embedded() -> Self {
        // The embedded constants are validated by test; a malformed entry
        // here is a build defect, not a runtime condition.
        Self::from_base64_sec1(EMBEDDED_TRUSTED_KEYS)
            .unwrap_or_else(|_| KeyRing { keys: Vec::new() })
    }

    pub fn from_base64_sec1(encoded: &[&str]) -> Result<Self, SigningError> {
        let mut keys = Vec::with_capacity(encoded.len());
        for entry in encoded {
            let raw = BASE64
                .decode(entry)
                .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
            let key = VerifyingKey::from_sec1_bytes(&raw)
                .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
            keys.push(key);
        }
        Ok(KeyRing { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Verify a manifest's ECDSA P-256 signature against the ring, trying
    /// keys in declared order. Any failure means the manifest must not be
    /// applied or persisted.
    pub fn verify(&self, manifest: &ConfigManifest) -> Result<(), SigningError> {
        let raw = BASE64
            .decode(&manifest.signature)
            .map_err(|e| SigningError::MalformedSignature(e.to_string()))?;
        if raw.len() != 64 {
            return Err(SigningError::WrongSignatureLength(raw.len()));
        }
        let signature = Signature::from_slice(&raw)
            .map_err(|e| SigningError::MalformedSignature(e.to_string()))?;

        let message = canonical_manifest_bytes(manifest)?;
        for key in &self.keys {
            if key.verify(&message, &signature).is_ok() {
                debug!(version = %manifest.version, issuer = %manifest.issuer, "manifest signature verified");
                return Ok(());
            }
        }
        warn!(version = %manifest.version, issuer = %manifest.issuer, "manifest signature rejected");
        Err(SigningError::VerificationFailed)
    }
}

// ── Backend signing role ──────────────────────────────────────────────────────

/// Load a signing key from raw 32-byte scalar material. Backend/offline use
/// and test fixtures only; the agent never holds private keys.
pub fn signing_key_from_bytes(raw: &[u8]) -> Result<SigningKey, SigningError> {
    SigningKey::from_slice(raw).map_err(|e| SigningError::InvalidSigningKey(e.to_string()))
}

/// Sign the canonical form of `manifest` (its current `signature` field is
/// ignored) and return the raw r∥s signature base64 encoded.
pub fn sign_manifest(key: &SigningKey, manifest: &ConfigManifest) -> Result<String, SigningError> {
    let message = canonical_manifest_bytes(manifest)?;
    let signature: Signature = key.sign(&message);
    Ok(BASE64.encode(signature.to_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    /// Scalar whose public key is the first entry of EMBEDDED_TRUSTED_KEYS.
    const DEV_SCALAR: [u8; 32] = [1u8; 32];

    fn signed_manifest() -> ConfigManifest {
        let mut manifest = ConfigManifest {
            version: "2024-02-01".into(),
            integrations: vec![],
            global_variables: BTreeMap::new(),
            signature: String::new(),
            signed_at: Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap(),
            issuer: "config-service".into(),
        };
        let key = signing_key_from_bytes(&DEV_SCALAR).unwrap();
        manifest.signature = sign_manifest(&key, &manifest).unwrap();
        manifest
    }

    #[test]
    fn embedded_ring_parses() {
        let ring = KeyRing::embedded();
        assert!(!ring.is_empty());
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let manifest = signed_manifest();
        KeyRing::embedded().verify(&manifest).unwrap();
    }

    #[test]
    fn bit_flip_in_signature_fails_verification() {
        let mut manifest = signed_manifest();
        let mut raw = BASE64.decode(&manifest.signature).unwrap();
        *raw.last_mut().unwrap() ^= 0x01;
        manifest.signature = BASE64.encode(&raw);

        assert!(matches!(
            KeyRing::embedded().verify(&manifest),
            Err(SigningError::VerificationFailed)
        ));
    }

    #[test]
    fn tampered_content_fails_verification() {
        let mut manifest = signed_manifest();
        manifest.version = "2024-03-01".into();
        assert!(KeyRing::embedded().verify(&manifest).is_err());
    }

    #[test]
    fn malformed_base64_is_rejected() {
        let mut manifest = signed_manifest();
        manifest.signature = "not base64 !!!".into();
        assert!(matches!(
            KeyRing::embedded().verify(&manifest),
            Err(SigningError::MalformedSignature(_))
        ));
    }

    #[test]
    fn wrong_length_signature_is_rejected() {
        let mut manifest = signed_manifest();
        manifest.signature = BASE64.encode([0u8; 32]);
        assert!(matches!(
            KeyRing::embedded().verify(&manifest),
            Err(SigningError::WrongSignatureLength(32))
        ));
    }

    #[test]
    fn untrusted_key_is_rejected() {
        let mut manifest = signed_manifest();
        let other = signing_key_from_bytes(&[2u8; 32]).unwrap();
        manifest.signature = sign_manifest(&other, &manifest).unwrap();
        assert!(KeyRing::embedded().verify(&manifest).is_err());
    }

    #[test]
    fn rotation_tries_keys_in_order() {
        let manifest = signed_manifest();
        let old_key = signing_key_from_bytes(&[2u8; 32]).unwrap();
        let current_key = signing_key_from_bytes(&DEV_SCALAR).unwrap();
        let ring =
            KeyRing::new(vec![old_key.verifying_key().clone(), current_key.verifying_key().clone()]);
        ring.verify(&manifest).unwrap();
    }
}
