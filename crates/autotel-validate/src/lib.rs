pub mod dryrun;
pub mod error;
pub mod policy;
pub mod structural;

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

pub use dryrun::{CollectorDryLoader, DryLoader, NoopDryLoader};
pub use error::ValidateError;

/// Three-layer validation of a candidate configuration: structural parse,
/// policy rules, then a collector dry-load.
pub struct Validator {
    dry_loader: Arc<dyn DryLoader>,
}

impl Validator {
    pub fn new(dry_loader: Arc<dyn DryLoader>) -> Self {
        Validator { dry_loader }
    }

    /// Structural and policy layers only; cheap and synchronous.
    pub fn check_static(config_bytes: &[u8]) -> Result<(), ValidateError> {
        let parsed = structural::parse(config_bytes)?;
        policy::check(&parsed)
    }

    /// All three layers. The candidate is written to a scratch file for the
    /// dry-load and removed afterwards.
    pub async fn validate(&self, config_bytes: &[u8]) -> Result<(), ValidateError> {
        Self::check_static(config_bytes)?;

        let scratch = std::env::temp_dir().join(format!("autotel-candidate-{}.yaml", Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&scratch, config_bytes).await {
            return Err(ValidateError::DryLoadUnavailable(format!(
                "could not stage candidate at {}: {}",
                scratch.display(),
                e
            )));
        }
        let result = self.dry_loader.dry_load(&scratch).await;
        let _ = tokio::fs::remove_file(&scratch).await;
        debug!(ok = result.is_ok(), "validation complete");
        result
    }
}
