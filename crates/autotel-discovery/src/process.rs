use async_trait::async_trait;
use autotel_domain::{DiscoverySignal, ProcessInfo};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind, Users};
use tracing::debug;

use crate::error::DiscoveryError;
use crate::patterns::kind_for_process;
use crate::scanner::{Candidate, ScanOutcome, Scanner};

/// Longest argument value reproduced verbatim in a recorded cmdline.
const MAX_ARG_LEN: usize = 64;

/// Enumerates the OS process table and matches executable basenames against
/// the static pattern table.
#[derive(Debug, Default)]
pub struct ProcessScanner;

impl ProcessScanner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Scanner for ProcessScanner {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn scan(&self) -> Result<ScanOutcome, DiscoveryError> {
        // The process-table walk is blocking CPU+procfs work.
        tokio::task::spawn_blocking(scan_process_table)
            .await
            .map_err(|e| DiscoveryError::ScannerFailed {
                scanner: "process",
                message: e.to_string(),
            })?
    }
}

fn scan_process_table() -> Result<ScanOutcome, DiscoveryError> {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::new()
            .with_cmd(UpdateKind::Always)
            .with_exe(UpdateKind::Always)
            .with_user(UpdateKind::Always),
    );
    let users = Users::new_with_refreshed_list();

    let mut outcome = ScanOutcome::default();
    for (pid, process) in system.processes() {
        let basename = process
            .exe()
            .and_then(|p| p.file_name())
            .unwrap_or_else(|| process.name())
            .to_string_lossy()
            .to_string();

        let Some(kind) = kind_for_process(&basename) else {
            continue;
        };

        let cmdline = redact_cmdline(
            process
                .cmd()
                .iter()
                .map(|a| a.to_string_lossy().to_string()),
        );
        let user = process
            .user_id()
            .and_then(|uid| users.get_user_by_id(uid))
            .map(|u| u.name().to_string());

        debug!(service = %kind, pid = pid.as_u32(), "process scan match");
        let mut candidate = Candidate::new(kind, DiscoverySignal::Process);
        candidate.process_info = Some(ProcessInfo { pid: pid.as_u32(), cmdline, user });
        outcome.candidates.push(candidate);
    }

    Ok(outcome)
}

/// Join argv into one line, replacing over-long values so connection strings
/// and inline credentials never end up in a baseline payload.
fn redact_cmdline(args: impl Iterator<Item = String>) -> String {
    args.map(|a| {
        if a.len() > MAX_ARG_LEN {
            "[redacted]".to_string()
        } else {
            a
        }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_values_are_redacted() {
        let args = vec!["mysqld".to_string(), "x".repeat(200)];
        let line = redact_cmdline(args.into_iter());
        assert_eq!(line, "mysqld [redacted]");
    }

    #[test]
    fn short_values_pass_through() {
        let args = vec!["redis-server".to_string(), "/etc/redis/redis.conf".to_string()];
        let line = redact_cmdline(args.into_iter());
        assert_eq!(line, "redis-server /etc/redis/redis.conf");
    }

    #[tokio::test]
    async fn scan_does_not_fail_on_a_live_host() {
        // The scanner must degrade, not error, whatever the environment.
        let outcome = ProcessScanner::new().scan().await.unwrap();
        for c in outcome.candidates {
            assert!(c.process_info.is_some());
        }
    }
}
