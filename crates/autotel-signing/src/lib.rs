pub mod canonical;
pub mod error;
pub mod verify;

pub use canonical::canonical_manifest_bytes;
pub use error::SigningError;
pub use verify::{
    sign_manifest, signing_key_from_bytes, KeyRing, EMBEDDED_TRUSTED_KEYS,
};
