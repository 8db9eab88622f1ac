use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ValidateError;

/// Longest stderr excerpt attached to a dry-load rejection.
const STDERR_EXCERPT_LEN: usize = 2000;

/// Asks the collector to load a candidate config without running pipelines.
/// Behind a trait so tests inject fixtures instead of a real binary.
#[async_trait]
pub trait DryLoader: Send + Sync + 'static {
    async fn dry_load(&self, config_path: &Path) -> Result<(), ValidateError>;
}

/// Runs `<collector_bin> --config <path> --dry-run`.
pub struct CollectorDryLoader {
    binary: PathBuf,
    timeout: Duration,
}

impl CollectorDryLoader {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        CollectorDryLoader { binary: binary.into(), timeout: Duration::from_secs(5) }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DryLoader for CollectorDryLoader {
    async fn dry_load(&self, config_path: &Path) -> Result<(), ValidateError> {
        debug!(binary = %self.binary.display(), config = %config_path.display(), "dry-loading config");
        let child = Command::new(&self.binary)
            .arg("--config")
            .arg(config_path)
            .arg("--dry-run")
            .stdin(std::process::Stdio::null())
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ValidateError::DryLoadUnavailable(e.to_string())),
            Err(_) => {
                return Err(ValidateError::DryLoadUnavailable(format!(
                    "dry-run did not finish within {:?}",
                    self.timeout
                )))
            }
        };

        if output.status.success() {
            return Ok(());
        }

        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        stderr.truncate(STDERR_EXCERPT_LEN);
        warn!(exit = output.status.code().unwrap_or(-1), "collector rejected config in dry-run");
        Err(ValidateError::DryLoad {
            exit_code: output.status.code().unwrap_or(-1),
            stderr,
        })
    }
}

/// Skips the dry-load layer. Used when no collector binary is configured and
/// by tests that only exercise structural and policy validation.
#[derive(Debug, Default)]
pub struct NoopDryLoader;

#[async_trait]
impl DryLoader for NoopDryLoader {
    async fn dry_load(&self, _config_path: &Path) -> Result<(), ValidateError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn success_exit_passes() {
        let loader = CollectorDryLoader::new("/bin/true");
        loader.dry_load(Path::new("/dev/null")).await.unwrap();
    }

    #[tokio::test]
    async fn nonzero_exit_is_rejection() {
        let loader = CollectorDryLoader::new("/bin/false");
        let err = loader.dry_load(Path::new("/dev/null")).await.unwrap_err();
        assert!(matches!(err, ValidateError::DryLoad { exit_code: 1, .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable_not_rejection() {
        let loader = CollectorDryLoader::new("/no/such/collector");
        let err = loader.dry_load(Path::new("/dev/null")).await.unwrap_err();
        assert!(matches!(err, ValidateError::DryLoadUnavailable(_)));
    }
}
