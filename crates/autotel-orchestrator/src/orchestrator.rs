use std::sync::Arc;
use std::time::Duration;

use autotel_domain::{
    AgentEvent, ConfigManifest, ConfigSource, ConfigVersionRecord, ErrorCategory, ErrorInfo,
    EventKind, GeneratedConfig, ReloadResult, ReloadStrategy, ServiceInfo,
};
use autotel_discovery::DiscoveryEngine;
use autotel_remote::{build_baseline, RemoteClient, RemoteError};
use autotel_store::{write_atomic, DataLayout, VersionStore};
use autotel_supervisor::Supervisor;
use autotel_template::Renderer;
use autotel_validate::Validator;
use chrono::Utc;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::command::{AgentSnapshot, Command, OrchestratorHandle, COMMAND_INBOX_DEPTH};
use crate::error::OrchestratorError;
use crate::events::EventBus;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub scan_interval: Duration,
    /// Fractional jitter applied to every tick interval (±).
    pub jitter_fraction: f64,
    pub auto_config_enabled: bool,
    /// Version records kept on disk (floor 2 enforced by the store).
    pub retention: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            scan_interval: Duration::from_secs(300),
            jitter_fraction: 0.10,
            auto_config_enabled: true,
            retention: autotel_store::DEFAULT_RETENTION,
        }
    }
}

/// The periodic driver: discover, report baseline, render, validate, write,
/// reload. Owns current state; everyone else reads snapshots or sends
/// commands.
pub struct Orchestrator {
    config: OrchestratorConfig,
    engine: DiscoveryEngine,
    renderer: Renderer,
    validator: Validator,
    store: Arc<dyn VersionStore>,
    layout: DataLayout,
    supervisor: Arc<Supervisor>,
    remote: Option<Arc<RemoteClient>>,
    events: Arc<EventBus>,
    rx: mpsc::Receiver<Command>,
    snapshot_tx: watch::Sender<AgentSnapshot>,
    enabled: bool,
    cached_manifest: Option<ConfigManifest>,
    last_services: Vec<ServiceInfo>,
    last_warnings: Vec<String>,
    last_scan_at: Option<chrono::DateTime<Utc>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        engine: DiscoveryEngine,
        renderer: Renderer,
        validator: Validator,
        store: Arc<dyn VersionStore>,
        layout: DataLayout,
        supervisor: Arc<Supervisor>,
        remote: Option<Arc<RemoteClient>>,
        events: Arc<EventBus>,
    ) -> (Orchestrator, OrchestratorHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_INBOX_DEPTH);
        let enabled = config.auto_config_enabled;
        let (snapshot_tx, snapshot_rx) = watch::channel(AgentSnapshot {
            auto_config_enabled: enabled,
            ..AgentSnapshot::default()
        });
        let orchestrator = Orchestrator {
            config,
            engine,
            renderer,
            validator,
            store,
            layout,
            supervisor,
            remote,
            events,
            rx,
            snapshot_tx,
            enabled,
            cached_manifest: None,
            last_services: Vec::new(),
            last_warnings: Vec::new(),
            last_scan_at: None,
        };
        (orchestrator, OrchestratorHandle { tx, snapshot_rx })
    }

    /// Long-lived task: an initial iteration, then the jittered periodic
    /// loop, interleaved with commands from the inbox.
    pub async fn run(mut self) {
        self.forward_supervisor_events();

        // Resume from persisted state.
        if let Ok(Some(record)) = self.store.latest_record().await {
            self.supervisor.set_config_version(record.version);
        }
        match self.store.load_cached_manifest().await {
            Ok(manifest) => self.cached_manifest = manifest,
            Err(e) => warn!(error = %e, "could not load cached manifest"),
        }

        if self.enabled {
            self.tick(ConfigSource::Initial).await;
        }

        loop {
            let interval = self.jittered_interval();
            tokio::select! {
                _ = tokio::time::sleep(interval), if self.enabled => {
                    self.tick(ConfigSource::Auto).await;
                }
                command = self.rx.recv() => match command {
                    Some(Command::ForceReload { reply }) => {
                        let result = self.tick(ConfigSource::Api).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::EnableAutoConfig) => {
                        if !self.enabled {
                            info!("auto-config enabled");
                            self.enabled = true;
                        }
                        self.publish_snapshot();
                    }
                    Some(Command::DisableAutoConfig) => {
                        if self.enabled {
                            // The supervisor keeps managing whatever config
                            // was last applied.
                            info!("auto-config disabled");
                            self.enabled = false;
                        }
                        self.publish_snapshot();
                    }
                    Some(Command::Shutdown) | None => {
                        if let Err(e) = self.supervisor.shutdown().await {
                            warn!(error = %e, "supervisor shutdown failed");
                        }
                        return;
                    }
                },
            }
        }
    }

    fn jittered_interval(&self) -> Duration {
        let fraction = self.config.jitter_fraction;
        let factor = rand::thread_rng().gen_range(1.0 - fraction..1.0 + fraction);
        self.config.scan_interval.mul_f64(factor)
    }

    /// Forward supervisor lifecycle events onto the shared bus.
    fn forward_supervisor_events(&self) {
        let mut rx = self.supervisor.events();
        let events = self.events.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => events.emit(event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
        });
    }

    // ── One iteration ─────────────────────────────────────────────────────

    pub async fn tick(&mut self, source: ConfigSource) -> ReloadResult {
        let old_version = self.supervisor.config_version();
        let builder = ReloadResult::begin(ReloadStrategy::BlueGreen, old_version);

        // 1. Discover.
        let report = match self.engine.discover().await {
            Ok(report) => report,
            Err(e) => {
                let info = OrchestratorError::from(e).to_error_info();
                self.events.emit(
                    AgentEvent::new(EventKind::ConfigRejected, "orchestrator", "discovery failed")
                        .with_error(info.clone()),
                );
                return builder.failed(info, None);
            }
        };
        if !report.warnings.is_empty() {
            self.events.emit(AgentEvent::new(
                EventKind::PermissionDenied,
                "discovery",
                format!("discovery degraded: {}", report.warnings.join("; ")),
            ));
        }
        self.last_services = report.services.clone();
        self.last_warnings = report.warnings.clone();
        self.last_scan_at = Some(Utc::now());
        self.publish_snapshot();

        // 2. Baseline + manifest, remote permitting.
        let manifest = self.refresh_manifest(report.services.clone()).await;

        // 3. Render; identical hash short-circuits the rest of the tick.
        let generated = match self.renderer.render(&report.services, manifest.as_ref()) {
            Ok(generated) => generated,
            Err(e) => {
                let info = OrchestratorError::from(e).to_error_info();
                self.events.emit(
                    AgentEvent::new(EventKind::ConfigRejected, "orchestrator", "render failed")
                        .with_error(info.clone()),
                );
                return builder.failed(info, None);
            }
        };
        if self.supervisor.applied_hash().as_deref() == Some(generated.content_hash.as_str()) {
            debug!(hash = %generated.content_hash, "config unchanged, skipping reload");
            return builder.no_change();
        }

        // 4. Validate; a rejected candidate leaves current state untouched.
        if let Err(e) = self.validator.validate(&generated.config_bytes).await {
            let info = OrchestratorError::from(e).to_error_info();
            self.events.emit(
                AgentEvent::new(EventKind::ConfigRejected, "orchestrator", "candidate config rejected")
                    .with_error(info.clone()),
            );
            return builder.failed(info, None);
        }

        // 5. Stage the candidate on disk (atomic rename).
        let next_version = old_version + 1;
        let staged_path = self.layout.version_config(next_version);
        if let Err(e) = write_atomic(&staged_path, &generated.config_bytes).await {
            let info = OrchestratorError::from(e).to_error_info();
            return builder.failed(info, None);
        }

        // 6. Apply: initial start, or blue-green reload.
        let running = self.supervisor.status().state.is_running();
        if !running {
            match self.supervisor.start(&staged_path).await {
                Ok(()) => {
                    self.commit_version(next_version, &generated, source).await;
                    self.events.emit(AgentEvent::new(
                        EventKind::ConfigChanged,
                        "orchestrator",
                        format!("applied config v{} ({} services)", next_version, report.services.len()),
                    ));
                    builder.success(next_version)
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&staged_path).await;
                    let info = OrchestratorError::from(e).to_error_info();
                    self.events.emit(
                        AgentEvent::new(EventKind::ConfigRejected, "orchestrator", "collector start failed")
                            .with_error(info.clone()),
                    );
                    builder.failed(info, None)
                }
            }
        } else {
            let result = self.supervisor.reload(&staged_path, ReloadStrategy::BlueGreen).await;
            if result.success && !result.no_change && !result.coalesced {
                self.commit_version(result.new_version, &generated, source).await;
                self.events.emit(AgentEvent::new(
                    EventKind::ConfigChanged,
                    "orchestrator",
                    format!(
                        "applied config v{} ({} services)",
                        result.new_version,
                        report.services.len()
                    ),
                ));
            } else if !result.success {
                let _ = tokio::fs::remove_file(&staged_path).await;
            } else {
                // no_change / coalesced: the staged copy duplicates current.
                let _ = tokio::fs::remove_file(&staged_path).await;
            }
            result
        }
    }

    /// Report the baseline and settle on the manifest to render with. Only a
    /// strictly newer verified manifest replaces the cached one; regressions
    /// and unreachable remotes fall back to the cache.
    async fn refresh_manifest(&mut self, services: Vec<ServiceInfo>) -> Option<ConfigManifest> {
        let remote = self.remote.clone()?;

        let baseline = build_baseline(services);
        match remote.report_baseline(&baseline).await {
            Ok(Some(manifest)) => {
                let newer = self
                    .cached_manifest
                    .as_ref()
                    .map_or(true, |cached| manifest.is_newer_than(&cached.version));
                if newer {
                    if let Err(e) = self.store.cache_manifest(&manifest).await {
                        warn!(error = %e, "could not cache manifest");
                    }
                    info!(version = %manifest.version, "adopted new remote manifest");
                    self.cached_manifest = Some(manifest);
                } else {
                    debug!(
                        version = %manifest.version,
                        "remote manifest is not newer than cached, ignoring"
                    );
                }
            }
            Ok(None) => debug!("remote reports no manifest change"),
            Err(e @ RemoteError::Verification(_)) => {
                let info = ErrorInfo::new(
                    ErrorCategory::Auth,
                    "remote",
                    "manifest_verification_failed",
                    e.to_string(),
                );
                self.events.emit(
                    AgentEvent::new(
                        EventKind::SecurityViolation,
                        "remote",
                        "remote manifest failed signature verification, discarded",
                    )
                    .with_error(info),
                );
            }
            Err(e) => {
                self.events.emit(AgentEvent::new(
                    EventKind::RemoteUnreachable,
                    "remote",
                    format!("remote config service unreachable, keeping cached manifest: {}", e),
                ));
            }
        }

        self.cached_manifest.clone()
    }

    async fn commit_version(&mut self, version: u64, generated: &GeneratedConfig, source: ConfigSource) {
        let record = ConfigVersionRecord::new(version, generated, source);
        if let Err(e) = self.store.record_version(&record, &generated.config_bytes).await {
            warn!(error = %e, version, "could not persist version record");
        }
        if let Err(e) = self.store.write_current(&generated.config_bytes).await {
            warn!(error = %e, "could not update current.yaml");
        }
        self.supervisor.set_config_version(version);
        match self.store.gc(self.config.retention).await {
            Ok(evicted) if !evicted.is_empty() => debug!(?evicted, "evicted old config versions"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "version gc failed"),
        }
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(AgentSnapshot {
            auto_config_enabled: self.enabled,
            current_version: self.supervisor.config_version(),
            applied_hash: self.supervisor.applied_hash(),
            last_services: self.last_services.clone(),
            last_manifest_version: self.cached_manifest.as_ref().map(|m| m.version.clone()),
            last_scan_at: self.last_scan_at,
            discovery_warnings: self.last_warnings.clone(),
        });
    }
}
