use autotel_domain::{ErrorCategory, ErrorInfo};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] autotel_discovery::DiscoveryError),

    #[error("render failed: {0}")]
    Render(#[from] autotel_template::RenderError),

    #[error("validation failed: {0}")]
    Validate(#[from] autotel_validate::ValidateError),

    #[error("store error: {0}")]
    Store(#[from] autotel_store::StoreError),

    #[error("supervisor error: {0}")]
    Supervisor(#[from] autotel_supervisor::SupervisorError),

    #[error("remote error: {0}")]
    Remote(#[from] autotel_remote::RemoteError),
}

impl OrchestratorError {
    pub fn to_error_info(&self) -> ErrorInfo {
        match self {
            OrchestratorError::Discovery(e) => ErrorInfo::new(
                ErrorCategory::Internal,
                "discovery",
                "discovery_failed",
                e.to_string(),
            ),
            OrchestratorError::Render(e) => ErrorInfo::new(
                ErrorCategory::Configuration,
                "renderer",
                "render_failed",
                e.to_string(),
            )
            .retryable(false),
            OrchestratorError::Validate(e) => e.to_error_info("candidate"),
            OrchestratorError::Store(e) => {
                ErrorInfo::new(ErrorCategory::Resource, "store", "store_failed", e.to_string())
            }
            OrchestratorError::Supervisor(e) => e.to_error_info(),
            OrchestratorError::Remote(e) => match e {
                autotel_remote::RemoteError::Verification(_) => ErrorInfo::new(
                    ErrorCategory::Auth,
                    "remote",
                    "manifest_verification_failed",
                    e.to_string(),
                ),
                _ => ErrorInfo::new(
                    ErrorCategory::Connection,
                    "remote",
                    "remote_unreachable",
                    e.to_string(),
                ),
            },
        }
    }
}
