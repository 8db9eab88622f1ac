use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::SupervisorError;

/// Environment variable the collector reads to pick its health endpoint
/// port. The blue-green reload starts the incoming instance on an alternate
/// port so the two never collide.
pub const HEALTH_PORT_ENV: &str = "COLLECTOR_HEALTH_PORT";

/// One spawned collector instance. The supervisor is the only owner; nothing
/// else signals or waits on the child directly.
#[derive(Debug)]
pub struct CollectorProcess {
    child: Child,
    pid: u32,
    pub started_at: DateTime<Utc>,
    pub health_port: u16,
}

impl CollectorProcess {
    /// Fork the collector with the given config, mirroring its output into
    /// the agent's log.
    pub async fn spawn(
        binary: &Path,
        config_path: &Path,
        health_port: u16,
    ) -> Result<CollectorProcess, SupervisorError> {
        info!(
            binary = %binary.display(),
            config = %config_path.display(),
            health_port,
            "spawning collector"
        );
        let mut child = Command::new(binary)
            .arg("--config")
            .arg(config_path)
            .env(HEALTH_PORT_ENV, health_port.to_string())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::SpawnFailed(format!("{}: {}", binary.display(), e)))?;

        let pid = child.id().ok_or_else(|| {
            SupervisorError::SpawnFailed("child exited before a pid was assigned".into())
        })?;

        // Mirror collector output line by line; the tasks end at EOF.
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "autotel::collector", "{}", line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "autotel::collector", "{}", line);
                }
            });
        }

        Ok(CollectorProcess { child, pid, started_at: Utc::now(), health_port })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Graceful-shutdown signal (SIGTERM). The child honors it by draining
    /// and exiting.
    pub fn signal_terminate(&self) {
        #[cfg(unix)]
        unsafe {
            libc::kill(self.pid as libc::pid_t, libc::SIGTERM);
        }
        #[cfg(not(unix))]
        {
            // No graceful signal off unix; the force-kill path applies.
        }
    }

    /// Non-blocking exit check.
    pub fn try_wait(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Await exit up to `timeout`. `None` means the child is still alive.
    pub async fn wait_exit(&mut self, timeout: Duration) -> Option<ExitStatus> {
        tokio::time::timeout(timeout, self.child.wait()).await.ok().and_then(|r| r.ok())
    }

    pub async fn force_kill(&mut self) {
        let _ = self.child.kill().await;
    }

    /// SIGTERM, bounded wait, SIGKILL on exceed.
    pub async fn terminate(&mut self, drain: Duration) {
        self.signal_terminate();
        if self.wait_exit(drain).await.is_none() {
            info!(pid = self.pid, "collector did not drain in time, force killing");
            self.force_kill().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn spawn_and_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "collector.sh", "#!/bin/sh\nsleep 60\n");
        let config = dir.path().join("config.yaml");
        std::fs::write(&config, "receivers: {}\n").unwrap();

        let mut process = CollectorProcess::spawn(&bin, &config, 13133).await.unwrap();
        assert!(process.pid() > 0);
        assert!(process.try_wait().is_none());

        process.terminate(Duration::from_secs(5)).await;
        // terminated, not timed out
        assert!(process.try_wait().is_some() || process.wait_exit(Duration::from_secs(1)).await.is_some());
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.yaml");
        std::fs::write(&config, "x: 1\n").unwrap();

        let err = CollectorProcess::spawn(Path::new("/no/such/bin"), &config, 13133)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::SpawnFailed(_)));
    }

    #[tokio::test]
    async fn immediate_exit_is_observable() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "crash.sh", "#!/bin/sh\nexit 3\n");
        let config = dir.path().join("config.yaml");
        std::fs::write(&config, "x: 1\n").unwrap();

        let mut process = CollectorProcess::spawn(&bin, &config, 13133).await.unwrap();
        let status = process.wait_exit(Duration::from_secs(5)).await.unwrap();
        assert_eq!(status.code(), Some(3));
    }
}
