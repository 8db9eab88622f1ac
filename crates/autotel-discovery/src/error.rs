use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("scanner '{scanner}' failed: {message}")]
    ScannerFailed { scanner: &'static str, message: String },

    #[error("permission denied reading {what}")]
    PermissionDenied { what: String },

    #[error("discovery deadline elapsed before any signal was gathered")]
    Cancelled,
}
