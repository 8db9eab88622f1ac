use std::path::PathBuf;

use async_trait::async_trait;
use autotel_domain::{DiscoverySignal, ServiceKind};
use tracing::debug;

use crate::error::DiscoveryError;
use crate::patterns::{config_paths_for, CONFIG_PATHS};
use crate::scanner::{Candidate, ScanOutcome, Scanner};

/// Probes a static set of well-known configuration paths per service type.
/// Existence of a path or directory is the signal; content is not parsed.
#[derive(Debug)]
pub struct ConfigFileScanner {
    /// Prefix prepended to every probed path. "/" in production; a temp dir
    /// in tests.
    root: PathBuf,
}

impl Default for ConfigFileScanner {
    fn default() -> Self {
        ConfigFileScanner { root: PathBuf::from("/") }
    }
}

impl ConfigFileScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        ConfigFileScanner { root: root.into() }
    }

    fn resolve(&self, well_known: &str) -> PathBuf {
        self.root.join(well_known.trim_start_matches('/'))
    }
}

#[async_trait]
impl Scanner for ConfigFileScanner {
    fn name(&self) -> &'static str {
        "config_file"
    }

    async fn scan(&self) -> Result<ScanOutcome, DiscoveryError> {
        let mut outcome = ScanOutcome::default();
        for (kind, _) in CONFIG_PATHS {
            let found = self.probe_kind(*kind, &mut outcome).await;
            if !found.is_empty() {
                debug!(service = %kind, paths = found.len(), "config file scan match");
                let mut candidate = Candidate::new(*kind, DiscoverySignal::ConfigFile);
                candidate.config_paths = found;
                outcome.candidates.push(candidate);
            }
        }
        Ok(outcome)
    }
}

impl ConfigFileScanner {
    async fn probe_kind(&self, kind: ServiceKind, outcome: &mut ScanOutcome) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for well_known in config_paths_for(kind) {
            let path = self.resolve(well_known);
            match tokio::fs::metadata(&path).await {
                Ok(_) => found.push(PathBuf::from(*well_known)),
                Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                    outcome
                        .warnings
                        .push(format!("permission denied probing {}", path.display()));
                }
                Err(_) => {}
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detects_present_config_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("etc/mysql")).unwrap();
        std::fs::write(dir.path().join("etc/memcached.conf"), "-m 64\n").unwrap();

        let scanner = ConfigFileScanner::with_root(dir.path());
        let outcome = scanner.scan().await.unwrap();

        let kinds: Vec<ServiceKind> = outcome.candidates.iter().map(|c| c.kind).collect();
        assert!(kinds.contains(&ServiceKind::Mysql));
        assert!(kinds.contains(&ServiceKind::Memcached));
        assert!(!kinds.contains(&ServiceKind::Redis));

        let mysql = outcome.candidates.iter().find(|c| c.kind == ServiceKind::Mysql).unwrap();
        assert_eq!(mysql.config_paths, vec![PathBuf::from("/etc/mysql")]);
    }

    #[tokio::test]
    async fn empty_root_finds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = ConfigFileScanner::with_root(dir.path());
        let outcome = scanner.scan().await.unwrap();
        assert!(outcome.candidates.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn resolve_strips_leading_slash() {
        let scanner = ConfigFileScanner::with_root("/tmp/fixture");
        assert_eq!(scanner.resolve("/etc/mysql"), PathBuf::from("/tmp/fixture/etc/mysql"));
    }
}
