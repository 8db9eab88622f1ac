use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

use autotel_domain::ServiceInfo;

use crate::config_file::ConfigFileScanner;
use crate::correlate::correlate;
use crate::error::DiscoveryError;
use crate::package::PackageScanner;
use crate::port::PortScanner;
use crate::process::ProcessScanner;
use crate::scanner::Scanner;

/// Result of one discovery pass. `partial` is set when at least one scanner
/// missed the deadline and its signals are absent.
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub services: Vec<ServiceInfo>,
    pub warnings: Vec<String>,
    pub partial: bool,
    pub generated_at: DateTime<Utc>,
}

/// Fans out the four scanners concurrently and correlates their signals.
/// Stateless between calls: nothing is cached past one invocation.
pub struct DiscoveryEngine {
    scanners: Vec<Arc<dyn Scanner>>,
    deadline: Duration,
}

impl DiscoveryEngine {
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(1);

    /// Engine with the production scanner set.
    pub fn with_defaults() -> Self {
        DiscoveryEngine::new(vec![
            Arc::new(ProcessScanner::new()),
            Arc::new(PortScanner::new()),
            Arc::new(ConfigFileScanner::new()),
            Arc::new(PackageScanner::default()),
        ])
    }

    pub fn new(scanners: Vec<Arc<dyn Scanner>>) -> Self {
        DiscoveryEngine { scanners, deadline: Self::DEFAULT_DEADLINE }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Run every scanner concurrently, correlate whatever completed within
    /// the deadline, and return the merged result. Errors only when the
    /// deadline elapsed before any signal was gathered.
    pub async fn discover(&self) -> Result<DiscoveryReport, DiscoveryError> {
        let mut join_set = JoinSet::new();
        for scanner in &self.scanners {
            let scanner = scanner.clone();
            let deadline = self.deadline;
            join_set.spawn(async move {
                let name = scanner.name();
                (name, timeout(deadline, scanner.scan()).await)
            });
        }

        let mut candidates = Vec::new();
        let mut warnings = Vec::new();
        let mut completed = 0usize;
        let mut partial = false;

        while let Some(joined) = join_set.join_next().await {
            let (name, result) = match joined {
                Ok(r) => r,
                Err(e) => {
                    warnings.push(format!("scanner task panicked: {}", e));
                    continue;
                }
            };
            match result {
                Ok(Ok(outcome)) => {
                    completed += 1;
                    debug!(scanner = name, candidates = outcome.candidates.len(), "scanner done");
                    candidates.extend(outcome.candidates);
                    warnings.extend(outcome.warnings);
                }
                Ok(Err(e)) => {
                    // Degrade: a denied or failed signal source drops out of
                    // the correlation, it does not fail the discovery.
                    warnings.push(format!("{} scanner: {}", name, e));
                }
                Err(_) => {
                    partial = true;
                    warnings.push(format!("{} scanner missed the {:?} deadline", name, self.deadline));
                }
            }
        }

        if completed == 0 && partial {
            return Err(DiscoveryError::Cancelled);
        }

        // One warning line per scan, not one per degraded signal.
        if !warnings.is_empty() {
            warn!(count = warnings.len(), "discovery degraded: {}", warnings.join("; "));
        }

        Ok(DiscoveryReport {
            services: correlate(candidates),
            warnings,
            partial,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{Candidate, ScanOutcome};
    use async_trait::async_trait;
    use autotel_domain::{Confidence, DiscoverySignal, ServiceKind};

    struct FixtureScanner {
        name: &'static str,
        outcome: ScanOutcome,
    }

    #[async_trait]
    impl Scanner for FixtureScanner {
        fn name(&self) -> &'static str {
            self.name
        }
        async fn scan(&self) -> Result<ScanOutcome, DiscoveryError> {
            Ok(self.outcome.clone())
        }
    }

    struct SlowScanner;

    #[async_trait]
    impl Scanner for SlowScanner {
        fn name(&self) -> &'static str {
            "slow"
        }
        async fn scan(&self) -> Result<ScanOutcome, DiscoveryError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ScanOutcome::default())
        }
    }

    struct DeniedScanner;

    #[async_trait]
    impl Scanner for DeniedScanner {
        fn name(&self) -> &'static str {
            "process"
        }
        async fn scan(&self) -> Result<ScanOutcome, DiscoveryError> {
            Err(DiscoveryError::PermissionDenied { what: "/proc".into() })
        }
    }

    fn port_fixture() -> FixtureScanner {
        let mut candidate = Candidate::new(ServiceKind::Redis, DiscoverySignal::Port);
        candidate.endpoints.push(autotel_domain::Endpoint::tcp("localhost", 6379));
        FixtureScanner {
            name: "port",
            outcome: ScanOutcome { candidates: vec![candidate], warnings: vec![] },
        }
    }

    #[tokio::test]
    async fn empty_scanners_yield_empty_success() {
        let engine = DiscoveryEngine::new(vec![
            Arc::new(FixtureScanner { name: "process", outcome: ScanOutcome::default() }),
            Arc::new(FixtureScanner { name: "port", outcome: ScanOutcome::default() }),
        ]);
        let report = engine.discover().await.unwrap();
        assert!(report.services.is_empty());
        assert!(!report.partial);
    }

    #[tokio::test]
    async fn denied_scanner_degrades_to_low_confidence_with_warning() {
        let engine = DiscoveryEngine::new(vec![Arc::new(DeniedScanner), Arc::new(port_fixture())]);
        let report = engine.discover().await.unwrap();

        assert_eq!(report.services.len(), 1);
        let svc = &report.services[0];
        assert_eq!(svc.discovered_by.len(), 1);
        assert!(svc.discovered_by.contains(&DiscoverySignal::Port));
        assert_eq!(svc.confidence, Confidence::Low);
        assert!(report.warnings.iter().any(|w| w.contains("process")));
    }

    #[tokio::test]
    async fn slow_scanner_marks_report_partial() {
        let engine = DiscoveryEngine::new(vec![Arc::new(SlowScanner), Arc::new(port_fixture())])
            .with_deadline(Duration::from_millis(50));
        let report = engine.discover().await.unwrap();

        assert!(report.partial);
        assert_eq!(report.services.len(), 1);
    }

    #[tokio::test]
    async fn all_scanners_timing_out_is_cancellation() {
        let engine = DiscoveryEngine::new(vec![Arc::new(SlowScanner)])
            .with_deadline(Duration::from_millis(20));
        assert!(matches!(engine.discover().await, Err(DiscoveryError::Cancelled)));
    }
}
