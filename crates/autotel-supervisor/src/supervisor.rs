use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autotel_domain::{
    content_hash, AgentEvent, CollectorState, CollectorStatus, ErrorCategory, ErrorInfo,
    EventKind, ReloadResult, ReloadResultBuilder, ReloadStrategy, RollbackInfo, Severity,
};
use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::error::SupervisorError;
use crate::health::HealthProbe;
use crate::process::CollectorProcess;
use crate::restart::RestartPolicy;

const EVENT_CHANNEL_CAPACITY: usize = 64;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub binary: PathBuf,
    pub health_port: u16,
    /// Health port for the incoming instance during a blue-green window.
    pub alternate_health_port: u16,
    pub start_grace: Duration,
    pub probe_interval: Duration,
    /// Consecutive probes the incoming instance must pass on reload.
    pub health_probe_count: u32,
    pub shutdown_timeout: Duration,
    pub drain_timeout: Duration,
    pub stability_window: Duration,
    pub restart: RestartPolicy,
    /// How often the monitor task checks the child.
    pub monitor_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            binary: PathBuf::from("autotel-collector"),
            health_port: 13133,
            alternate_health_port: 13233,
            start_grace: Duration::from_secs(10),
            probe_interval: Duration::from_secs(1),
            health_probe_count: 3,
            shutdown_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(30),
            stability_window: Duration::from_secs(30),
            restart: RestartPolicy::default(),
            monitor_interval: Duration::from_millis(500),
        }
    }
}

// ── Internal state ────────────────────────────────────────────────────────────

struct Inner {
    state: CollectorState,
    child: Option<CollectorProcess>,
    /// Bumped whenever ownership of the child changes; a monitor task whose
    /// generation no longer matches exits silently.
    generation: u64,
    config_path: Option<PathBuf>,
    applied_hash: Option<String>,
    config_version: u64,
    active_health_port: u16,
    restart_count: u32,
    consecutive_failures: u32,
    last_error: Option<ErrorInfo>,
}

struct Shared {
    config: SupervisorConfig,
    probe: Arc<dyn HealthProbe>,
    inner: Mutex<Inner>,
    status_tx: watch::Sender<CollectorStatus>,
    events: broadcast::Sender<AgentEvent>,
}

impl Shared {
    fn publish(&self) {
        let status = {
            let inner = self.inner.lock().expect("supervisor lock");
            snapshot(&inner)
        };
        self.status_tx.send_replace(status);
    }

    fn emit(&self, event: AgentEvent) {
        let _ = self.events.send(event);
    }
}

/// Point-in-time status; never exposes a half-updated version.
fn snapshot(inner: &Inner) -> CollectorStatus {
    let start_time = inner.child.as_ref().map(|c| c.started_at);
    let uptime_secs = start_time
        .map(|t| (Utc::now() - t).num_seconds().max(0) as u64)
        .unwrap_or(0);
    CollectorStatus {
        state: inner.state,
        version: None,
        config_version: inner.config_version,
        pid: inner.child.as_ref().map(|c| c.pid()),
        start_time,
        uptime_secs,
        restart_count: inner.restart_count,
        pipelines: if inner.state.is_running() { vec!["metrics".into()] } else { Vec::new() },
        resource_metrics: Default::default(),
        last_error: inner.last_error.clone(),
    }
}

// ── Supervisor ────────────────────────────────────────────────────────────────

/// Owns the collector child process and its whole lifecycle: start with
/// readiness grace, graceful stop, restart back-off with a crash-loop
/// threshold, and zero-downtime blue-green reload with rollback.
pub struct Supervisor {
    shared: Arc<Shared>,
    reload_gate: Arc<tokio::sync::Mutex<()>>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, probe: Arc<dyn HealthProbe>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let health_port = config.health_port;
        let inner = Inner {
            state: CollectorState::Stopped,
            child: None,
            generation: 0,
            config_path: None,
            applied_hash: None,
            config_version: 0,
            active_health_port: health_port,
            restart_count: 0,
            consecutive_failures: 0,
            last_error: None,
        };
        let (status_tx, _) = watch::channel(CollectorStatus::default());
        Supervisor {
            shared: Arc::new(Shared {
                config,
                probe,
                inner: Mutex::new(inner),
                status_tx,
                events,
            }),
            reload_gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn status(&self) -> CollectorStatus {
        self.shared.status_tx.borrow().clone()
    }

    pub fn status_watch(&self) -> watch::Receiver<CollectorStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<AgentEvent> {
        self.shared.events.subscribe()
    }

    pub fn config_version(&self) -> u64 {
        self.shared.inner.lock().expect("supervisor lock").config_version
    }

    /// Hash of the currently applied configuration, if any.
    pub fn applied_hash(&self) -> Option<String> {
        self.shared.inner.lock().expect("supervisor lock").applied_hash.clone()
    }

    /// Align the internal version counter with the version store; called by
    /// the orchestrator after recording an apply.
    pub fn set_config_version(&self, version: u64) {
        self.shared.inner.lock().expect("supervisor lock").config_version = version;
        self.shared.publish();
    }

    // ── Start ─────────────────────────────────────────────────────────────

    /// Fork the collector and wait for its health endpoint to report ready
    /// within the start grace. On timeout the child is killed and a
    /// configuration failure is returned.
    pub async fn start(&self, config_path: &Path) -> Result<(), SupervisorError> {
        {
            let mut inner = self.shared.inner.lock().expect("supervisor lock");
            if let Some(child) = &inner.child {
                return Err(SupervisorError::AlreadyRunning { pid: child.pid() });
            }
            inner.state = CollectorState::Starting;
            inner.config_path = Some(config_path.to_path_buf());
        }
        self.shared.publish();

        let bytes = match tokio::fs::read(config_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.mark_stopped_with(None);
                return Err(SupervisorError::BadConfigPath(format!(
                    "{}: {}",
                    config_path.display(),
                    e
                )));
            }
        };
        if bytes.is_empty() {
            self.mark_stopped_with(None);
            return Err(SupervisorError::BadConfigPath(format!(
                "{} is empty",
                config_path.display()
            )));
        }
        let hash = content_hash(&bytes);

        let port = self.shared.config.health_port;
        let mut process =
            match CollectorProcess::spawn(&self.shared.config.binary, config_path, port).await {
                Ok(p) => p,
                Err(e) => {
                    self.mark_stopped_with(Some(e.to_error_info()));
                    return Err(e);
                }
            };

        if let Err(e) = await_ready(
            &mut process,
            self.shared.probe.as_ref(),
            port,
            self.shared.config.start_grace,
            1,
            Duration::from_millis(250),
        )
        .await
        {
            process.force_kill().await;
            self.mark_stopped_with(Some(e.to_error_info()));
            return Err(e);
        }

        let generation = {
            let mut inner = self.shared.inner.lock().expect("supervisor lock");
            inner.child = Some(process);
            inner.generation += 1;
            inner.state = CollectorState::Running;
            inner.active_health_port = port;
            inner.applied_hash = Some(hash);
            inner.last_error = None;
            inner.generation
        };
        self.shared.publish();
        self.shared
            .emit(AgentEvent::new(EventKind::Started, "supervisor", "collector started"));
        tokio::spawn(monitor(self.shared.clone(), generation));
        Ok(())
    }

    fn mark_stopped_with(&self, error: Option<ErrorInfo>) {
        {
            let mut inner = self.shared.inner.lock().expect("supervisor lock");
            inner.state = CollectorState::Stopped;
            if error.is_some() {
                inner.last_error = error;
            }
        }
        self.shared.publish();
    }

    // ── Stop ──────────────────────────────────────────────────────────────

    /// Graceful shutdown of the child: SIGTERM, bounded wait, force-kill.
    /// Idempotent. An in-flight blue-green reload is aborted first: it sees
    /// the Stopping state at its next checkpoint, kills its incoming
    /// instance, and releases the reload gate, so no collector survives this
    /// call.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        {
            let mut inner = self.shared.inner.lock().expect("supervisor lock");
            if inner.child.is_some() || inner.state == CollectorState::Reloading {
                inner.state = CollectorState::Stopping;
            } else {
                inner.state = CollectorState::Stopped;
            }
        }
        self.shared.publish();

        // Wait for any in-flight reload to finish or abort. Afterwards the
        // incoming instance is either committed into `child` or already dead.
        let _reload_guard = self.reload_gate.lock().await;
        self.stop_child().await
    }

    /// Take down whatever child is installed. Callers hold the reload gate
    /// (or are the reload itself).
    async fn stop_child(&self) -> Result<(), SupervisorError> {
        let child = {
            let mut inner = self.shared.inner.lock().expect("supervisor lock");
            match inner.child.take() {
                None => {
                    inner.state = CollectorState::Stopped;
                    None
                }
                Some(child) => {
                    inner.state = CollectorState::Stopping;
                    // Taking the child cancels its monitor.
                    inner.generation += 1;
                    Some(child)
                }
            }
        };
        self.shared.publish();

        if let Some(mut child) = child {
            child.terminate(self.shared.config.shutdown_timeout).await;
            {
                let mut inner = self.shared.inner.lock().expect("supervisor lock");
                inner.state = CollectorState::Stopped;
            }
            self.shared.publish();
            self.shared
                .emit(AgentEvent::new(EventKind::Stopped, "supervisor", "collector stopped"));
        }
        Ok(())
    }

    /// Graceful shutdown of the supervisor itself: the child is cleanly
    /// stopped before this returns.
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        self.stop().await
    }

    // ── Reload ────────────────────────────────────────────────────────────

    /// At most one reload runs at a time; a trigger arriving while one is in
    /// flight returns immediately with `coalesced = true`.
    pub async fn reload(&self, new_config_path: &Path, strategy: ReloadStrategy) -> ReloadResult {
        let old_version = self.config_version();
        let builder = ReloadResult::begin(strategy, old_version);

        let Ok(_guard) = self.reload_gate.try_lock() else {
            return builder.coalesced();
        };

        match strategy {
            ReloadStrategy::BlueGreen => self.reload_blue_green(builder, new_config_path).await,
            ReloadStrategy::Restart => self.reload_restart(builder, new_config_path).await,
        }
    }

    async fn reload_blue_green(
        &self,
        builder: ReloadResultBuilder,
        new_config_path: &Path,
    ) -> ReloadResult {
        let config = &self.shared.config;

        // 1. Cheap precondition: readable and non-empty.
        let bytes = match tokio::fs::read(new_config_path).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            _ => {
                let err = SupervisorError::BadConfigPath(new_config_path.display().to_string());
                return builder.failed(err.to_error_info(), None);
            }
        };
        let new_hash = content_hash(&bytes);

        let (old_version, old_path, old_port, running) = {
            let inner = self.shared.inner.lock().expect("supervisor lock");
            if inner.applied_hash.as_deref() == Some(new_hash.as_str()) {
                // Identical config: no child restart.
                return builder.no_change();
            }
            (
                inner.config_version,
                inner.config_path.clone(),
                inner.active_health_port,
                inner.child.is_some(),
            )
        };

        if !running {
            return builder.failed(SupervisorError::NotRunning.to_error_info(), None);
        }

        {
            let mut inner = self.shared.inner.lock().expect("supervisor lock");
            inner.state = CollectorState::Reloading;
        }
        self.shared.publish();

        // 2. Fork the incoming instance on the alternate health/admin port.
        let incoming_port = if old_port == config.health_port {
            config.alternate_health_port
        } else {
            config.health_port
        };
        let mut incoming =
            match CollectorProcess::spawn(&config.binary, new_config_path, incoming_port).await {
                Ok(p) => p,
                Err(e) => {
                    self.restore_running();
                    return builder.failed(
                        e.to_error_info(),
                        Some(RollbackInfo {
                            triggered: true,
                            reason: "spawn_failed".into(),
                            restored_version: old_version,
                        }),
                    );
                }
            };

        // 3. The incoming instance must pass N consecutive health probes.
        if await_ready(
            &mut incoming,
            self.shared.probe.as_ref(),
            incoming_port,
            config.start_grace,
            config.health_probe_count,
            config.probe_interval,
        )
        .await
        .is_err()
        {
            incoming.force_kill().await;
            self.restore_running();
            self.shared.emit(AgentEvent::new(
                EventKind::ConfigRolledBack,
                "supervisor",
                "incoming collector failed health checks, keeping current config",
            ));
            let err = ErrorInfo::new(
                ErrorCategory::Configuration,
                "supervisor",
                "health_check_failed",
                "new instance failed consecutive health probes",
            );
            return builder.failed(
                err,
                Some(RollbackInfo {
                    triggered: true,
                    reason: "health_check_failed".into(),
                    restored_version: old_version,
                }),
            );
        }

        // 4+5. Switchover: stop the old instance's receivers by draining it;
        // the incoming instance takes the receiver ports as they are
        // released. The gap is bounded by how fast the old process closes
        // its listeners, well under the 1 s contract.
        let old_child = {
            let mut inner = self.shared.inner.lock().expect("supervisor lock");
            inner.generation += 1; // cancels the old monitor
            inner.child.take()
        };
        if let Some(mut old_child) = old_child {
            info!(pid = old_child.pid(), "draining previous collector");
            old_child.signal_terminate();
            let drain = config.drain_timeout;
            tokio::spawn(async move {
                if old_child.wait_exit(drain).await.is_none() {
                    warn!(pid = old_child.pid(), "previous collector exceeded drain timeout");
                    old_child.force_kill().await;
                }
            });
        }

        // 6. Stability window: a crash of the incoming instance inside the
        // window triggers rollback to the last-known-good config. A stop()
        // arriving mid-window aborts within one poll step instead of letting
        // the incoming instance run out the window.
        let deadline = Instant::now() + config.stability_window;
        loop {
            if let Some(status) = incoming.try_wait() {
                warn!(code = ?status.code(), "incoming collector crashed inside stability window");
                return self
                    .rollback_after_crash(builder, old_path, old_version, old_port)
                    .await;
            }
            if self.stop_requested() {
                incoming.force_kill().await;
                let err = ErrorInfo::new(
                    ErrorCategory::Internal,
                    "supervisor",
                    "reload_aborted",
                    "supervisor stopped during reload",
                );
                return builder.failed(err, None);
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep((deadline - now).min(Duration::from_millis(50))).await;
        }

        // Last-instant re-check: never commit after stop(), never leave two
        // collectors.
        if self.stop_requested() {
            incoming.force_kill().await;
            let err = ErrorInfo::new(
                ErrorCategory::Internal,
                "supervisor",
                "reload_aborted",
                "supervisor stopped during reload",
            );
            return builder.failed(err, None);
        }

        // 7. Commit: the incoming instance is the collector now.
        let new_version = old_version + 1;
        let generation = {
            let mut inner = self.shared.inner.lock().expect("supervisor lock");
            inner.child = Some(incoming);
            inner.generation += 1;
            inner.state = CollectorState::Running;
            inner.config_path = Some(new_config_path.to_path_buf());
            inner.applied_hash = Some(new_hash);
            inner.config_version = new_version;
            inner.active_health_port = incoming_port;
            inner.last_error = None;
            inner.generation
        };
        self.shared.publish();
        self.shared.emit(AgentEvent::new(
            EventKind::Reloaded,
            "supervisor",
            format!("collector reloaded (v{} -> v{})", old_version, new_version),
        ));
        tokio::spawn(monitor(self.shared.clone(), generation));
        builder.success(new_version)
    }

    /// Plain restart strategy: stop the child, start it with the new config.
    /// Data in flight during the gap is lost; blue-green is the default for
    /// a reason.
    async fn reload_restart(
        &self,
        builder: ReloadResultBuilder,
        new_config_path: &Path,
    ) -> ReloadResult {
        let old_version = self.config_version();
        // stop_child, not stop(): the reload gate is already held here.
        if let Err(e) = self.stop_child().await {
            return builder.failed(e.to_error_info(), None);
        }
        match self.start(new_config_path).await {
            Ok(()) => {
                let new_version = old_version + 1;
                self.set_config_version(new_version);
                builder.success(new_version)
            }
            Err(e) => builder.failed(
                e.to_error_info(),
                Some(RollbackInfo {
                    triggered: false,
                    reason: "restart_failed".into(),
                    restored_version: old_version,
                }),
            ),
        }
    }

    fn restore_running(&self) {
        {
            let mut inner = self.shared.inner.lock().expect("supervisor lock");
            // Only undo the Reloading transition; a Stopping state set by a
            // concurrent stop() must survive.
            if inner.child.is_some() && inner.state == CollectorState::Reloading {
                inner.state = CollectorState::Running;
            }
        }
        self.shared.publish();
    }

    fn stop_requested(&self) -> bool {
        let inner = self.shared.inner.lock().expect("supervisor lock");
        matches!(inner.state, CollectorState::Stopping | CollectorState::Stopped)
    }

    /// The incoming instance died inside the stability window: restart the
    /// previous config and restore the previous version number, so `version`
    /// keeps tracking applied-config identity.
    async fn rollback_after_crash(
        &self,
        builder: ReloadResultBuilder,
        old_path: Option<PathBuf>,
        old_version: u64,
        old_port: u16,
    ) -> ReloadResult {
        self.shared.emit(AgentEvent::new(
            EventKind::ConfigRolledBack,
            "supervisor",
            "incoming collector crashed, rolling back to last-known-good config",
        ));

        let err = ErrorInfo::new(
            ErrorCategory::Configuration,
            "supervisor",
            "stability_window",
            "new instance crashed within the stability window",
        );
        let rollback = Some(RollbackInfo {
            triggered: true,
            reason: "stability_window".into(),
            restored_version: old_version,
        });

        let Some(old_path) = old_path else {
            self.mark_failed("no previous config available for rollback");
            return builder.failed(err, rollback);
        };

        // A stop() racing the rollback wins: leave nothing running.
        if self.stop_requested() {
            return builder.failed(err, rollback);
        }

        match CollectorProcess::spawn(&self.shared.config.binary, &old_path, old_port).await {
            Ok(mut process) => {
                let ready = await_ready(
                    &mut process,
                    self.shared.probe.as_ref(),
                    old_port,
                    self.shared.config.start_grace,
                    1,
                    Duration::from_millis(250),
                )
                .await;
                if ready.is_err() {
                    process.force_kill().await;
                    self.mark_failed("rollback instance failed to become ready");
                    return builder.failed(err, rollback);
                }
                let generation = {
                    let mut inner = self.shared.inner.lock().expect("supervisor lock");
                    inner.child = Some(process);
                    inner.generation += 1;
                    inner.state = CollectorState::Running;
                    inner.config_path = Some(old_path.clone());
                    inner.config_version = old_version;
                    inner.active_health_port = old_port;
                    inner.generation
                };
                // Recompute the applied hash from the restored file.
                if let Ok(bytes) = std::fs::read(&old_path) {
                    self.shared.inner.lock().expect("supervisor lock").applied_hash =
                        Some(content_hash(&bytes));
                }
                self.shared.publish();
                tokio::spawn(monitor(self.shared.clone(), generation));
            }
            Err(e) => {
                self.mark_failed(format!("rollback spawn failed: {}", e));
            }
        }
        builder.failed(err, rollback)
    }

    fn mark_failed(&self, message: impl Into<String>) {
        let message = message.into();
        {
            let mut inner = self.shared.inner.lock().expect("supervisor lock");
            inner.state = CollectorState::Failed;
            inner.last_error = Some(
                ErrorInfo::new(
                    ErrorCategory::Internal,
                    "supervisor",
                    "rollback_failed",
                    message.clone(),
                )
                .with_severity(Severity::Critical),
            );
        }
        self.shared.publish();
        self.shared
            .emit(AgentEvent::new(EventKind::CrashLoop, "supervisor", message));
    }
}

// ── Readiness helper ──────────────────────────────────────────────────────────

/// Wait for `consecutive` successful probes while also watching for an early
/// child exit.
async fn await_ready(
    process: &mut CollectorProcess,
    probe: &dyn HealthProbe,
    port: u16,
    grace: Duration,
    consecutive: u32,
    interval: Duration,
) -> Result<(), SupervisorError> {
    let deadline = Instant::now() + grace;
    let mut streak = 0u32;
    loop {
        if let Some(status) = process.try_wait() {
            return Err(SupervisorError::ExitedOnStart { code: status.code() });
        }
        if probe.ready(port).await {
            streak += 1;
            if streak >= consecutive {
                return Ok(());
            }
        } else {
            streak = 0;
        }
        if Instant::now() + interval > deadline {
            return Err(SupervisorError::StartTimeout { grace_secs: grace.as_secs() });
        }
        sleep(interval).await;
    }
}

// ── Monitor task ──────────────────────────────────────────────────────────────

/// One monitor task per live child. Reaps unexpected exits (intentional
/// stops take the child out of the shared state first, so anything observed
/// here is a crash), flips Running ↔ Degraded on health flaps, and resets
/// the consecutive-failure counter once the child has stayed up through the
/// stability window.
fn monitor(
    shared: Arc<Shared>,
    generation: u64,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(monitor_inner(shared, generation))
}

async fn monitor_inner(shared: Arc<Shared>, generation: u64) {
    let interval = shared.config.monitor_interval;
    let stability = shared.config.stability_window;
    let started = Instant::now();
    let mut stable_reported = false;
    let mut ticks = 0u32;

    loop {
        sleep(interval).await;
        ticks += 1;

        let exited = {
            let mut inner = shared.inner.lock().expect("supervisor lock");
            if inner.generation != generation {
                return;
            }
            match inner.child.as_mut() {
                None => return,
                Some(child) => child.try_wait(),
            }
        };

        if let Some(status) = exited {
            handle_unexpected_exit(shared, generation, status.code()).await;
            return;
        }

        if !stable_reported && started.elapsed() >= stability {
            stable_reported = true;
            let mut inner = shared.inner.lock().expect("supervisor lock");
            if inner.generation == generation {
                inner.consecutive_failures = 0;
            }
        }

        // Light health watch: every ~10 ticks flip Running <-> Degraded.
        if ticks % 10 == 0 {
            let port = {
                let inner = shared.inner.lock().expect("supervisor lock");
                if inner.generation != generation {
                    return;
                }
                inner.active_health_port
            };
            let healthy = shared.probe.ready(port).await;
            let flapped = {
                let mut inner = shared.inner.lock().expect("supervisor lock");
                if inner.generation != generation {
                    return;
                }
                match (inner.state, healthy) {
                    (CollectorState::Running, false) => {
                        inner.state = CollectorState::Degraded;
                        true
                    }
                    (CollectorState::Degraded, true) => {
                        inner.state = CollectorState::Running;
                        true
                    }
                    _ => false,
                }
            };
            if flapped {
                shared.publish();
                shared.emit(AgentEvent::new(
                    EventKind::HealthChanged,
                    "supervisor",
                    if healthy { "collector healthy again" } else { "collector health degraded" },
                ));
            }
        }
    }
}

async fn handle_unexpected_exit(shared: Arc<Shared>, generation: u64, code: Option<i32>) {
    let config_path = {
        let mut inner = shared.inner.lock().expect("supervisor lock");
        if inner.generation != generation {
            return;
        }
        inner.child = None;
        inner.consecutive_failures += 1;
        inner.state = CollectorState::Starting;
        let err = ErrorInfo::new(
            ErrorCategory::Resource,
            "supervisor",
            "child_exit",
            format!("collector exited unexpectedly (code {:?})", code),
        );
        inner.last_error = Some(err);
        inner.config_path.clone()
    };
    shared.publish();
    shared.emit(AgentEvent::new(
        EventKind::Crashed,
        "supervisor",
        format!("collector crashed (code {:?})", code),
    ));

    let Some(config_path) = config_path else {
        let mut inner = shared.inner.lock().expect("supervisor lock");
        inner.state = CollectorState::Stopped;
        drop(inner);
        shared.publish();
        return;
    };

    restart_loop(shared, config_path).await;
}

/// Exponential back-off restarts until the child stays up or the crash-loop
/// threshold is crossed.
async fn restart_loop(shared: Arc<Shared>, config_path: PathBuf) {
    loop {
        let (attempt, port) = {
            let inner = shared.inner.lock().expect("supervisor lock");
            if matches!(inner.state, CollectorState::Stopping | CollectorState::Stopped) {
                return;
            }
            (inner.consecutive_failures, inner.active_health_port)
        };

        if attempt > shared.config.restart.max_restarts {
            enter_crash_loop(&shared);
            return;
        }

        let delay = shared.config.restart.delay_for(attempt);
        warn!(attempt, delay_secs = delay.as_secs_f64(), "restarting collector after crash");
        sleep(delay).await;

        {
            let inner = shared.inner.lock().expect("supervisor lock");
            if matches!(inner.state, CollectorState::Stopping | CollectorState::Stopped) {
                return;
            }
        }

        let spawned =
            CollectorProcess::spawn(&shared.config.binary, &config_path, port).await;
        match spawned {
            Ok(mut process) => {
                let ready = await_ready(
                    &mut process,
                    shared.probe.as_ref(),
                    port,
                    shared.config.start_grace,
                    1,
                    Duration::from_millis(250),
                )
                .await;
                match ready {
                    Ok(()) => {
                        enum Outcome {
                            Stopping(CollectorProcess),
                            Installed(u64),
                        }
                        let outcome = {
                            let mut inner = shared.inner.lock().expect("supervisor lock");
                            if matches!(
                                inner.state,
                                CollectorState::Stopping | CollectorState::Stopped
                            ) {
                                Outcome::Stopping(process)
                            } else {
                                inner.child = Some(process);
                                inner.generation += 1;
                                inner.state = CollectorState::Running;
                                inner.restart_count += 1;
                                Outcome::Installed(inner.generation)
                            }
                        };
                        match outcome {
                            Outcome::Stopping(mut process) => {
                                process.force_kill().await;
                                return;
                            }
                            Outcome::Installed(generation) => {
                                shared.publish();
                                shared.emit(AgentEvent::new(
                                    EventKind::Started,
                                    "supervisor",
                                    "collector restarted after crash",
                                ));
                                tokio::spawn(monitor(shared.clone(), generation));
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        process.force_kill().await;
                        let mut inner = shared.inner.lock().expect("supervisor lock");
                        inner.consecutive_failures += 1;
                        inner.last_error = Some(e.to_error_info());
                    }
                }
            }
            Err(e) => {
                let mut inner = shared.inner.lock().expect("supervisor lock");
                inner.consecutive_failures += 1;
                inner.last_error = Some(e.to_error_info());
            }
        }
        shared.publish();
    }
}

fn enter_crash_loop(shared: &Arc<Shared>) {
    {
        let mut inner = shared.inner.lock().expect("supervisor lock");
        inner.state = CollectorState::Failed;
    }
    shared.publish();
    shared.emit(AgentEvent::new(
        EventKind::CrashLoop,
        "supervisor",
        "collector is crash looping, giving up automatic restarts",
    ));
}
