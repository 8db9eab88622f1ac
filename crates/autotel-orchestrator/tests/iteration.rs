use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autotel_discovery::{Candidate, DiscoveryEngine, DiscoveryError, ScanOutcome, Scanner};
use autotel_domain::{CollectorState, ConfigSource, DiscoverySignal, Endpoint, ServiceKind};
use autotel_orchestrator::{EventBus, Orchestrator, OrchestratorConfig, OrchestratorHandle};
use autotel_store::{DataLayout, FsVersionStore, VersionStore};
use autotel_supervisor::stubs::AlwaysReady;
use autotel_supervisor::{RestartPolicy, Supervisor, SupervisorConfig};
use autotel_template::Renderer;
use autotel_validate::{NoopDryLoader, Validator};

struct FixtureScanner {
    name: &'static str,
    candidates: Vec<Candidate>,
}

#[async_trait]
impl Scanner for FixtureScanner {
    fn name(&self) -> &'static str {
        self.name
    }
    async fn scan(&self) -> Result<ScanOutcome, DiscoveryError> {
        Ok(ScanOutcome { candidates: self.candidates.clone(), warnings: vec![] })
    }
}

fn empty_engine() -> DiscoveryEngine {
    DiscoveryEngine::new(vec![
        Arc::new(FixtureScanner { name: "process", candidates: vec![] }),
        Arc::new(FixtureScanner { name: "port", candidates: vec![] }),
    ])
}

fn mysql_engine() -> DiscoveryEngine {
    let process = Candidate::new(ServiceKind::Mysql, DiscoverySignal::Process);
    let mut port = Candidate::new(ServiceKind::Mysql, DiscoverySignal::Port);
    port.endpoints.push(Endpoint::tcp("localhost", 3306));
    DiscoveryEngine::new(vec![
        Arc::new(FixtureScanner { name: "process", candidates: vec![process] }),
        Arc::new(FixtureScanner { name: "port", candidates: vec![port] }),
    ])
}

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<FsVersionStore>,
    supervisor: Arc<Supervisor>,
    layout: DataLayout,
}

async fn fixture(engine: DiscoveryEngine) -> (Orchestrator, OrchestratorHandle, Fixture) {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path().join("data"));
    layout.ensure().await.unwrap();

    let bin = dir.path().join("collector.sh");
    std::fs::write(&bin, "#!/bin/sh\nsleep 60\n").unwrap();
    std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

    let supervisor_config = SupervisorConfig {
        binary: bin,
        start_grace: Duration::from_millis(500),
        probe_interval: Duration::from_millis(10),
        stability_window: Duration::from_millis(50),
        monitor_interval: Duration::from_millis(20),
        restart: RestartPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            max_restarts: 2,
        },
        ..SupervisorConfig::default()
    };
    let supervisor = Arc::new(Supervisor::new(supervisor_config, Arc::new(AlwaysReady)));
    let store = Arc::new(FsVersionStore::new(layout.clone()));

    let (orchestrator, handle) = Orchestrator::new(
        OrchestratorConfig {
            scan_interval: Duration::from_secs(300),
            ..OrchestratorConfig::default()
        },
        engine,
        Renderer::new(),
        Validator::new(Arc::new(NoopDryLoader)),
        store.clone(),
        layout.clone(),
        supervisor.clone(),
        None,
        Arc::new(EventBus::new()),
    );
    (orchestrator, handle, Fixture { _dir: dir, store, supervisor, layout })
}

#[tokio::test]
async fn first_tick_on_empty_host_applies_common_config() {
    let (mut orchestrator, _handle, fx) = fixture(empty_engine()).await;

    let result = orchestrator.tick(ConfigSource::Initial).await;
    assert!(result.success, "tick failed: {:?}", result.error);
    assert_eq!(result.new_version, 1);

    let status = fx.supervisor.status();
    assert_eq!(status.state, CollectorState::Running);
    assert_eq!(status.config_version, 1);

    let current = fx.store.read_current().await.unwrap().unwrap();
    let text = String::from_utf8(current).unwrap();
    assert!(text.contains("hostmetrics:"));
    assert!(!text.contains("mysql:"));
    assert!(text.contains("${env:LICENSE_KEY}"));

    let record = fx.store.latest_record().await.unwrap().unwrap();
    assert_eq!(record.version, 1);
    assert_eq!(record.source, ConfigSource::Initial);
    assert!(fx.layout.version_config(1).exists());

    fx.supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn unchanged_host_skips_reload_on_second_tick() {
    let (mut orchestrator, _handle, fx) = fixture(empty_engine()).await;

    let first = orchestrator.tick(ConfigSource::Initial).await;
    assert!(first.success);
    let pid = fx.supervisor.status().pid.unwrap();

    let second = orchestrator.tick(ConfigSource::Auto).await;
    assert!(second.success && second.no_change, "expected no_change, got {:?}", second);
    assert_eq!(fx.supervisor.status().config_version, 1);
    assert_eq!(fx.supervisor.status().pid.unwrap(), pid, "no child restart");

    fx.supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn discovered_mysql_lands_in_applied_config() {
    let (mut orchestrator, _handle, fx) = fixture(mysql_engine()).await;

    let result = orchestrator.tick(ConfigSource::Initial).await;
    assert!(result.success);

    let snapshot_services = {
        let current = fx.store.read_current().await.unwrap().unwrap();
        String::from_utf8(current).unwrap()
    };
    assert!(snapshot_services.contains("mysql:"));
    assert!(snapshot_services.contains("endpoint: localhost:3306"));
    assert!(snapshot_services.contains("${env:MYSQL_MONITOR_USER}"));

    fx.supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn run_loop_serves_force_reload_and_toggles() {
    let (orchestrator, handle, fx) = fixture(empty_engine()).await;
    let run = tokio::spawn(orchestrator.run());

    // Wait until the initial tick applied v1.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while fx.supervisor.status().state != CollectorState::Running {
        assert!(tokio::time::Instant::now() < deadline, "initial apply never happened");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Nothing changed, so a forced iteration reports no_change.
    let result = handle.force_reload().await.expect("orchestrator alive");
    assert!(result.success && result.no_change);

    assert!(handle.disable_auto_config().await);
    assert!(handle.enable_auto_config().await);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !handle.snapshot().auto_config_enabled {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(handle.snapshot().current_version, 1);

    // Shutdown cleanly stops the child.
    assert!(handle.shutdown().await);
    run.await.unwrap();
    assert_eq!(fx.supervisor.status().state, CollectorState::Stopped);
}

#[tokio::test]
async fn snapshot_reflects_discovered_services() {
    let (mut orchestrator, handle, fx) = fixture(mysql_engine()).await;
    orchestrator.tick(ConfigSource::Initial).await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.current_version, 1);
    assert_eq!(snapshot.last_services.len(), 1);
    assert_eq!(snapshot.last_services[0].kind, ServiceKind::Mysql);
    assert!(snapshot.applied_hash.is_some());
    assert!(snapshot.last_scan_at.is_some());

    fx.supervisor.stop().await.unwrap();
}
