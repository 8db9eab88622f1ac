use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use autotel_api::{build_app, ApiAuth, AppState};
use autotel_config::{AgentConfig, LogFormat, LoggingConfig};
use autotel_discovery::DiscoveryEngine;
use autotel_orchestrator::{EventBus, Orchestrator, OrchestratorConfig};
use autotel_remote::RemoteClient;
use autotel_signing::KeyRing;
use autotel_store::{DataLayout, FsVersionStore, VersionStore};
use autotel_supervisor::{HttpHealthProbe, RestartPolicy, Supervisor, SupervisorConfig};
use autotel_template::Renderer;
use autotel_validate::{CollectorDryLoader, NoopDryLoader, Validator};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::OutputFormat;
use crate::output;

/// Binary names searched on PATH when no explicit collector path is
/// configured.
const COLLECTOR_CANDIDATES: [&str; 2] = ["autotel-collector", "otelcol"];

// ── Errors & exit codes ───────────────────────────────────────────────────────

#[derive(Debug)]
pub enum AgentError {
    /// Fatal configuration error at startup.
    Config(String),
    /// Unrecoverable child supervision failure.
    Supervision(String),
    /// Authentication or signing key misconfiguration.
    Keys(String),
}

impl AgentError {
    pub fn exit_code(&self) -> i32 {
        match self {
            AgentError::Config(_) => 1,
            AgentError::Supervision(_) => 2,
            AgentError::Keys(_) => 3,
        }
    }
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::Config(msg) => write!(f, "configuration error: {}", msg),
            AgentError::Supervision(msg) => write!(f, "supervision failure: {}", msg),
            AgentError::Keys(msg) => write!(f, "key misconfiguration: {}", msg),
        }
    }
}

// ── Shared wiring ─────────────────────────────────────────────────────────────

pub fn load_config(path: Option<&Path>) -> Result<AgentConfig, AgentError> {
    match path {
        Some(path) => autotel_config::load(path).map_err(|e| AgentError::Config(e.to_string())),
        None => Ok(autotel_config::from_env()),
    }
}

pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.clone()));

    if let Some(path) = &logging.file {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let writer = Arc::new(file);
                match logging.format {
                    LogFormat::Json => tracing_subscriber::fmt()
                        .json()
                        .with_env_filter(filter)
                        .with_writer(move || writer.clone())
                        .init(),
                    LogFormat::Text => tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_ansi(false)
                        .with_target(false)
                        .with_writer(move || writer.clone())
                        .init(),
                }
                return;
            }
            Err(e) => eprintln!("could not open log file {}: {}, logging to stderr", path.display(), e),
        }
    }

    match logging.format {
        LogFormat::Json => {
            tracing_subscriber::fmt().json().with_env_filter(filter).init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
        }
    }
}

fn find_collector_binary(config: &AgentConfig) -> Result<PathBuf, AgentError> {
    if let Some(binary) = &config.collector.binary {
        if binary.is_file() {
            return Ok(binary.clone());
        }
        return Err(AgentError::Config(format!(
            "configured collector binary {} does not exist",
            binary.display()
        )));
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        for name in COLLECTOR_CANDIDATES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }
    Err(AgentError::Config(format!(
        "no collector binary found (searched PATH for {}); set collector.binary or COLLECTOR_BINARY",
        COLLECTOR_CANDIDATES.join(", ")
    )))
}

fn base_variables(config: &AgentConfig) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert("SERVICE_NAME".to_string(), config.service.name.clone());
    vars.insert("ENVIRONMENT".to_string(), config.service.environment.clone());
    if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
        let id = id.trim();
        if !id.is_empty() {
            vars.insert("HOST_ID".to_string(), id.to_string());
        }
    }
    vars
}

fn supervisor_config(config: &AgentConfig, binary: PathBuf) -> SupervisorConfig {
    let c = &config.collector;
    SupervisorConfig {
        binary,
        health_port: c.health_port,
        alternate_health_port: c.alternate_health_port,
        start_grace: c.start_grace,
        shutdown_timeout: c.shutdown_timeout,
        drain_timeout: c.drain_timeout,
        stability_window: c.stability_window,
        health_probe_count: c.health_probe_count,
        restart: RestartPolicy { max_restarts: c.max_restarts, ..RestartPolicy::default() },
        ..SupervisorConfig::default()
    }
}

// ── run ───────────────────────────────────────────────────────────────────────

pub async fn run(config_path: Option<PathBuf>) -> Result<(), AgentError> {
    let config = load_config(config_path.as_deref())?;
    init_tracing(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "autotel agent starting");

    let layout = DataLayout::new(&config.data_dir);
    layout
        .ensure()
        .await
        .map_err(|e| AgentError::Config(format!("data_dir {}: {}", config.data_dir.display(), e)))?;
    layout
        .write_pid(std::process::id())
        .map_err(|e| AgentError::Config(e.to_string()))?;

    let binary = find_collector_binary(&config)?;
    info!(collector = %binary.display(), "using collector binary");

    // Remote config is optional; when enabled it needs credentials and at
    // least one embedded trusted key.
    let remote = if config.remote.enabled {
        if config.license_key.is_empty() {
            return Err(AgentError::Keys(
                "remote config enabled but no license key configured (set LICENSE_KEY)".into(),
            ));
        }
        let ring = KeyRing::embedded();
        if ring.is_empty() {
            return Err(AgentError::Keys("no trusted manifest signing keys embedded".into()));
        }
        let client = RemoteClient::new(
            config.remote.endpoint.clone(),
            config.license_key.clone(),
            ring,
            config.remote.fetch_timeout,
        )
        .map_err(|e| AgentError::Config(e.to_string()))?;
        Some(Arc::new(client))
    } else {
        None
    };

    let supervisor = Arc::new(Supervisor::new(
        supervisor_config(&config, binary.clone()),
        Arc::new(HttpHealthProbe::new()),
    ));
    let store: Arc<dyn VersionStore> = Arc::new(FsVersionStore::new(layout.clone()));
    let events = Arc::new(EventBus::new());
    let renderer = Renderer::with_base_variables(base_variables(&config));
    let validator = Validator::new(Arc::new(CollectorDryLoader::new(binary)));

    let (orchestrator, handle) = Orchestrator::new(
        OrchestratorConfig {
            scan_interval: config.auto_config.scan_interval,
            auto_config_enabled: config.auto_config.enabled,
            ..OrchestratorConfig::default()
        },
        DiscoveryEngine::with_defaults(),
        renderer.clone(),
        validator,
        store.clone(),
        layout.clone(),
        supervisor.clone(),
        remote,
        events.clone(),
    );
    let orchestrator_task = tokio::spawn(orchestrator.run());

    let auth = match &config.api.auth {
        autotel_config::ApiAuth::Disabled => ApiAuth::Disabled,
        autotel_config::ApiAuth::Bearer { token } => ApiAuth::Bearer { token: token.clone() },
    };
    let metrics_url =
        format!("http://127.0.0.1:{}/metrics", config.collector.metrics_port);
    let app = build_app(AppState {
        orchestrator: handle.clone(),
        supervisor: supervisor.clone(),
        store,
        events,
        engine: Arc::new(DiscoveryEngine::with_defaults()),
        renderer: Arc::new(renderer),
        validator: Arc::new(Validator::new(Arc::new(NoopDryLoader))),
        auth: Arc::new(auth),
        metrics_url: Arc::new(metrics_url),
        http: reqwest::Client::new(),
    });

    let listener = tokio::net::TcpListener::bind(&config.api.listen_addr)
        .await
        .map_err(|e| AgentError::Config(format!("bind {}: {}", config.api.listen_addr, e)))?;
    info!(addr = %config.api.listen_addr, "control API listening");

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = serve.await {
        warn!(error = %e, "control API exited with error");
    }

    info!("shutting down");
    handle.shutdown().await;
    let supervision = orchestrator_task.await;
    layout.remove_pid().ok();
    supervision.map_err(|e| AgentError::Supervision(format!("orchestrator task died: {}", e)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// ── One-shot commands ─────────────────────────────────────────────────────────

pub async fn discover(output: OutputFormat) -> Result<(), AgentError> {
    let engine = DiscoveryEngine::with_defaults();
    let report = engine
        .discover()
        .await
        .map_err(|e| AgentError::Config(e.to_string()))?;

    match output {
        OutputFormat::Json => {
            let doc = serde_json::json!({
                "services": report.services,
                "generated_at": report.generated_at,
                "partial": report.partial,
                "warnings": report.warnings,
            });
            println!("{}", serde_json::to_string_pretty(&doc).expect("serializable report"));
        }
        OutputFormat::Text => output::print_services_text(&report.services),
    }
    Ok(())
}

pub async fn render(config_path: Option<PathBuf>) -> Result<(), AgentError> {
    let config = load_config(config_path.as_deref())?;
    let engine = DiscoveryEngine::with_defaults();
    let report = engine
        .discover()
        .await
        .map_err(|e| AgentError::Config(e.to_string()))?;

    let renderer = Renderer::with_base_variables(base_variables(&config));
    let generated = renderer
        .render(&report.services, None)
        .map_err(|e| AgentError::Config(e.to_string()))?;
    print!("{}", generated.as_str());
    Ok(())
}

pub async fn validate(config_path: Option<PathBuf>, file: PathBuf) -> Result<(), AgentError> {
    let bytes = std::fs::read(&file)
        .map_err(|e| AgentError::Config(format!("{}: {}", file.display(), e)))?;

    // Use the real collector for the dry-load layer when one is resolvable.
    let validator = match load_config(config_path.as_deref())
        .ok()
        .and_then(|c| find_collector_binary(&c).ok())
    {
        Some(binary) => Validator::new(Arc::new(CollectorDryLoader::new(binary))),
        None => Validator::new(Arc::new(NoopDryLoader)),
    };

    match validator.validate(&bytes).await {
        Ok(()) => {
            println!("{}: valid", file.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: invalid: {}", file.display(), e);
            Err(AgentError::Config(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_the_contract() {
        assert_eq!(AgentError::Config("x".into()).exit_code(), 1);
        assert_eq!(AgentError::Supervision("x".into()).exit_code(), 2);
        assert_eq!(AgentError::Keys("x".into()).exit_code(), 3);
    }

    #[test]
    fn missing_configured_binary_is_config_error() {
        let mut config = AgentConfig::default();
        config.collector.binary = Some(PathBuf::from("/no/such/collector"));
        assert!(matches!(find_collector_binary(&config), Err(AgentError::Config(_))));
    }

    #[test]
    fn base_variables_carry_service_identity() {
        let config = AgentConfig::default();
        let vars = base_variables(&config);
        assert_eq!(vars.get("SERVICE_NAME").unwrap(), "autotel");
        assert_eq!(vars.get("ENVIRONMENT").unwrap(), "production");
    }
}
