use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote rejected credentials (status {status})")]
    Auth { status: u16 },

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("manifest failed signature verification: {0}")]
    Verification(#[from] autotel_signing::SigningError),

    #[error("response could not be decoded: {0}")]
    InvalidResponse(String),

    #[error("retries exhausted after {elapsed_secs} s: {last}")]
    RetriesExhausted { elapsed_secs: u64, last: String },
}

impl RemoteError {
    /// Connection-category failures retry; auth and verification never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport(_) => true,
            RemoteError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
