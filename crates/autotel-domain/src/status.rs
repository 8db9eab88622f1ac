use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error_info::ErrorInfo;

// ── Collector lifecycle ───────────────────────────────────────────────────────

/// Lifecycle state of the supervised collector child.
///
/// Transitions:
///   Stopped → Starting → Running ↔ Reloading
///   Starting | Running → Stopping → Stopped
///   Running → Degraded (health flap) → Running
///   Running → Failed (crash loop threshold reached)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollectorState {
    #[default]
    Stopped,
    Starting,
    Running,
    Reloading,
    Stopping,
    Degraded,
    Failed,
}

impl CollectorState {
    pub fn is_running(&self) -> bool {
        matches!(self, CollectorState::Running | CollectorState::Reloading | CollectorState::Degraded)
    }
}

impl std::fmt::Display for CollectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CollectorState::Stopped => "stopped",
            CollectorState::Starting => "starting",
            CollectorState::Running => "running",
            CollectorState::Reloading => "reloading",
            CollectorState::Stopping => "stopping",
            CollectorState::Degraded => "degraded",
            CollectorState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceMetrics {
    pub cpu_percent: f32,
    pub memory_mb: u64,
}

/// Point-in-time snapshot of the supervised collector. Snapshots are
/// immutable copies; no reader ever sees a half-updated version.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollectorStatus {
    pub state: CollectorState,
    /// Version string reported by the collector binary, when known.
    pub version: Option<String>,
    pub config_version: u64,
    pub pid: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
    pub restart_count: u32,
    pub pipelines: Vec<String>,
    pub resource_metrics: ResourceMetrics,
    pub last_error: Option<ErrorInfo>,
}

// ── Reload results ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReloadStrategy {
    #[default]
    BlueGreen,
    Restart,
}

impl std::fmt::Display for ReloadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReloadStrategy::BlueGreen => write!(f, "blue_green"),
            ReloadStrategy::Restart => write!(f, "restart"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackInfo {
    pub triggered: bool,
    pub reason: String,
    pub restored_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResult {
    pub success: bool,
    pub strategy: ReloadStrategy,
    pub old_version: u64,
    pub new_version: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    /// True when the candidate hash matched the applied hash and no child was
    /// touched.
    #[serde(default)]
    pub no_change: bool,
    /// True when this trigger was absorbed by an already-pending reload.
    #[serde(default)]
    pub coalesced: bool,
    pub error: Option<ErrorInfo>,
    pub rollback_info: Option<RollbackInfo>,
}

impl ReloadResult {
    pub fn begin(strategy: ReloadStrategy, old_version: u64) -> ReloadResultBuilder {
        ReloadResultBuilder { strategy, old_version, start_time: Utc::now() }
    }
}

pub struct ReloadResultBuilder {
    strategy: ReloadStrategy,
    old_version: u64,
    start_time: DateTime<Utc>,
}

impl ReloadResultBuilder {
    pub fn success(self, new_version: u64) -> ReloadResult {
        self.finish(true, new_version, None, None)
    }

    pub fn no_change(self) -> ReloadResult {
        let old = self.old_version;
        let mut r = self.finish(true, old, None, None);
        r.no_change = true;
        r
    }

    pub fn coalesced(self) -> ReloadResult {
        let old = self.old_version;
        let mut r = self.finish(true, old, None, None);
        r.coalesced = true;
        r
    }

    pub fn failed(self, error: ErrorInfo, rollback: Option<RollbackInfo>) -> ReloadResult {
        let old = self.old_version;
        self.finish(false, old, Some(error), rollback)
    }

    fn finish(
        self,
        success: bool,
        new_version: u64,
        error: Option<ErrorInfo>,
        rollback_info: Option<RollbackInfo>,
    ) -> ReloadResult {
        let end_time = Utc::now();
        let duration_ms = (end_time - self.start_time).num_milliseconds().max(0) as u64;
        ReloadResult {
            success,
            strategy: self.strategy,
            old_version: self.old_version,
            new_version,
            start_time: self.start_time,
            end_time,
            duration_ms,
            no_change: false,
            coalesced: false,
            error,
            rollback_info,
        }
    }
}
