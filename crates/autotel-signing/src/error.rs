use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid public key material: {0}")]
    InvalidKey(String),

    #[error("invalid signing key material: {0}")]
    InvalidSigningKey(String),

    #[error("signature is not valid base64: {0}")]
    MalformedSignature(String),

    #[error("signature has wrong length: expected 64 raw bytes, got {0}")]
    WrongSignatureLength(usize),

    #[error("signature did not verify against any trusted key")]
    VerificationFailed,

    #[error("manifest could not be canonicalized: {0}")]
    Canonicalization(String),
}
