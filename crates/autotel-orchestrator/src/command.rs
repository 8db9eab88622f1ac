use autotel_domain::{ReloadResult, ServiceInfo};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};

/// Inbox depth for external triggers. Writes from the control API are
/// serialized through this channel; the reload path itself coalesces, so a
/// small bound is enough backpressure.
pub const COMMAND_INBOX_DEPTH: usize = 8;

/// Messages other components send to the orchestrator. The orchestrator is
/// the only writer of current state; everyone else goes through here.
#[derive(Debug)]
pub enum Command {
    /// Run one full iteration now and report the outcome.
    ForceReload { reply: oneshot::Sender<ReloadResult> },
    EnableAutoConfig,
    DisableAutoConfig,
    Shutdown,
}

/// Read-only snapshot of the orchestrator's current state, published on a
/// watch channel after every change.
#[derive(Debug, Clone, Default)]
pub struct AgentSnapshot {
    pub auto_config_enabled: bool,
    pub current_version: u64,
    pub applied_hash: Option<String>,
    pub last_services: Vec<ServiceInfo>,
    pub last_manifest_version: Option<String>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub discovery_warnings: Vec<String>,
}

/// Cloneable handle for talking to a running orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
    pub(crate) tx: mpsc::Sender<Command>,
    pub(crate) snapshot_rx: watch::Receiver<AgentSnapshot>,
}

impl OrchestratorHandle {
    /// Trigger one orchestrator iteration and wait for its result.
    pub async fn force_reload(&self) -> Option<ReloadResult> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::ForceReload { reply }).await.ok()?;
        rx.await.ok()
    }

    pub async fn enable_auto_config(&self) -> bool {
        self.tx.send(Command::EnableAutoConfig).await.is_ok()
    }

    pub async fn disable_auto_config(&self) -> bool {
        self.tx.send(Command::DisableAutoConfig).await.is_ok()
    }

    pub async fn shutdown(&self) -> bool {
        self.tx.send(Command::Shutdown).await.is_ok()
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        self.snapshot_rx.borrow().clone()
    }
}
