use std::sync::Arc;

use async_trait::async_trait;
use autotel_domain::DiscoverySignal;
use tokio::process::Command;
use tracing::debug;

use crate::error::DiscoveryError;
use crate::patterns::{packages_for, PACKAGE_PATTERNS};
use crate::scanner::{Candidate, ScanOutcome, Scanner};

/// An installed package as reported by the system package database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: Option<String>,
}

/// Abstraction over the system package database so tests can inject fixtures
/// instead of shelling out.
#[async_trait]
pub trait PackageQuery: Send + Sync + 'static {
    /// Which of `names` are installed, with versions where known.
    async fn installed(&self, names: &[&str]) -> Result<Vec<PackageInfo>, DiscoveryError>;
}

// ── dpkg / rpm backed query ───────────────────────────────────────────────────

/// Queries `dpkg-query` first and falls back to `rpm`. Either tool being
/// absent is not an error; the scanner simply contributes nothing.
#[derive(Debug, Default)]
pub struct SystemPackageQuery;

impl SystemPackageQuery {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PackageQuery for SystemPackageQuery {
    async fn installed(&self, names: &[&str]) -> Result<Vec<PackageInfo>, DiscoveryError> {
        if let Some(found) = query_dpkg(names).await? {
            return Ok(found);
        }
        if let Some(found) = query_rpm(names).await? {
            return Ok(found);
        }
        Ok(Vec::new())
    }
}

/// `dpkg-query -W -f='${Package} ${Version}\n' <names>`. Returns None when
/// dpkg-query itself is missing.
async fn query_dpkg(names: &[&str]) -> Result<Option<Vec<PackageInfo>>, DiscoveryError> {
    let output = Command::new("dpkg-query")
        .arg("-W")
        .arg("-f=${Package} ${Version}\n")
        .args(names)
        .output()
        .await;

    let output = match output {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(DiscoveryError::ScannerFailed {
                scanner: "package",
                message: format!("dpkg-query: {}", e),
            })
        }
    };

    // dpkg-query exits non-zero when any queried name is not installed but
    // still prints the ones that are.
    Ok(Some(parse_name_version_lines(&String::from_utf8_lossy(&output.stdout))))
}

/// `rpm -q --qf '%{NAME} %{VERSION}\n' <names>`.
async fn query_rpm(names: &[&str]) -> Result<Option<Vec<PackageInfo>>, DiscoveryError> {
    let output = Command::new("rpm")
        .arg("-q")
        .arg("--qf")
        .arg("%{NAME} %{VERSION}\n")
        .args(names)
        .output()
        .await;

    let output = match output {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(DiscoveryError::ScannerFailed {
                scanner: "package",
                message: format!("rpm: {}", e),
            })
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    // rpm prints "package X is not installed" lines for misses; keep hits only.
    let installed = parse_name_version_lines(
        &stdout
            .lines()
            .filter(|l| !l.contains("is not installed"))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    Ok(Some(installed))
}

fn parse_name_version_lines(stdout: &str) -> Vec<PackageInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?.to_string();
            let version = parts.next().map(|v| v.to_string());
            Some(PackageInfo { name, version })
        })
        .collect()
}

// ── Scanner ───────────────────────────────────────────────────────────────────

/// Maps installed packages to service kinds via the static package table.
pub struct PackageScanner {
    query: Arc<dyn PackageQuery>,
}

impl PackageScanner {
    pub fn new(query: Arc<dyn PackageQuery>) -> Self {
        PackageScanner { query }
    }
}

impl Default for PackageScanner {
    fn default() -> Self {
        PackageScanner { query: Arc::new(SystemPackageQuery::new()) }
    }
}

#[async_trait]
impl Scanner for PackageScanner {
    fn name(&self) -> &'static str {
        "package"
    }

    async fn scan(&self) -> Result<ScanOutcome, DiscoveryError> {
        let mut outcome = ScanOutcome::default();
        for (kind, _) in PACKAGE_PATTERNS {
            let names = packages_for(*kind);
            let installed = match self.query.installed(names).await {
                Ok(found) => found,
                Err(e) => {
                    outcome.warnings.push(format!("package query for {} failed: {}", kind, e));
                    continue;
                }
            };
            if let Some(pkg) = installed.first() {
                debug!(service = %kind, package = %pkg.name, "package scan match");
                let mut candidate = Candidate::new(*kind, DiscoverySignal::Package);
                candidate.version = pkg.version.clone();
                outcome.candidates.push(candidate);
            }
        }
        Ok(outcome)
    }
}
