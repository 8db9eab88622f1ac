use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::ConfigError;
use crate::raw::{RawApiAuth, RawConfig};

// ── Domain configuration ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub license_key: String,
    pub service: ServiceMeta,
    pub auto_config: AutoConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    pub data_dir: PathBuf,
    pub collector: CollectorConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceMeta {
    pub name: String,
    pub environment: String,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoConfig {
    pub enabled: bool,
    pub scan_interval: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub listen_addr: String,
    pub auth: ApiAuth,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiAuth {
    Disabled,
    Bearer { token: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    pub binary: Option<PathBuf>,
    pub health_port: u16,
    pub alternate_health_port: u16,
    pub metrics_port: u16,
    pub start_grace: Duration,
    pub shutdown_timeout: Duration,
    pub drain_timeout: Duration,
    pub stability_window: Duration,
    pub max_restarts: u32,
    pub health_probe_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub fetch_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            license_key: String::new(),
            service: ServiceMeta {
                name: "autotel".into(),
                environment: "production".into(),
                tags: BTreeMap::new(),
            },
            auto_config: AutoConfig { enabled: true, scan_interval: Duration::from_secs(300) },
            api: ApiConfig { listen_addr: "127.0.0.1:4320".into(), auth: ApiAuth::Disabled },
            logging: LoggingConfig { level: "info".into(), format: LogFormat::Text, file: None },
            data_dir: PathBuf::from("/var/lib/autotel"),
            collector: CollectorConfig {
                binary: None,
                health_port: 13133,
                alternate_health_port: 13233,
                metrics_port: 8888,
                start_grace: Duration::from_secs(10),
                shutdown_timeout: Duration::from_secs(30),
                drain_timeout: Duration::from_secs(30),
                stability_window: Duration::from_secs(30),
                max_restarts: 10,
                health_probe_count: 3,
            },
            remote: RemoteConfig {
                enabled: false,
                endpoint: "https://config.autotel.example".into(),
                fetch_timeout: Duration::from_secs(30),
            },
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load the agent configuration from `path`, then apply environment variable
/// overrides. A missing optional section falls back to its default.
pub fn load(path: &Path) -> Result<AgentConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let raw: RawConfig = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!("loaded agent config from {}", path.display());
    let mut config = convert(raw, path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Defaults with environment overrides only; used when no config file exists.
pub fn from_env() -> AgentConfig {
    let mut config = AgentConfig::default();
    apply_env_overrides(&mut config);
    config
}

fn convert(raw: RawConfig, path: &Path) -> Result<AgentConfig, ConfigError> {
    let defaults = AgentConfig::default();

    let auth = match raw.api.auth {
        None => defaults.api.auth.clone(),
        Some(RawApiAuth { mode, token }) => match mode.as_str() {
            "disabled" => ApiAuth::Disabled,
            "bearer" => {
                let token = token.ok_or_else(|| ConfigError::Conversion {
                    path: path.display().to_string(),
                    message: "api.auth.mode = bearer requires api.auth.token".into(),
                })?;
                ApiAuth::Bearer { token }
            }
            other => {
                return Err(ConfigError::Conversion {
                    path: path.display().to_string(),
                    message: format!("unknown api.auth.mode '{}'", other),
                })
            }
        },
    };

    let format = match raw.logging.format.as_deref() {
        None => defaults.logging.format,
        Some("text") => LogFormat::Text,
        Some("json") => LogFormat::Json,
        Some(other) => {
            return Err(ConfigError::Conversion {
                path: path.display().to_string(),
                message: format!("unknown logging.format '{}'", other),
            })
        }
    };

    let scan_interval = raw.auto_config.scan_interval.map(Duration::from_secs);
    if let Some(interval) = scan_interval {
        if interval.is_zero() {
            return Err(ConfigError::Conversion {
                path: path.display().to_string(),
                message: "auto_config.scan_interval must be positive".into(),
            });
        }
    }

    let c = raw.collector;
    Ok(AgentConfig {
        license_key: raw.license_key.unwrap_or_default(),
        service: ServiceMeta {
            name: raw.service.name.unwrap_or(defaults.service.name),
            environment: raw.service.environment.unwrap_or(defaults.service.environment),
            tags: raw.service.tags,
        },
        auto_config: AutoConfig {
            enabled: raw.auto_config.enabled.unwrap_or(defaults.auto_config.enabled),
            scan_interval: scan_interval.unwrap_or(defaults.auto_config.scan_interval),
        },
        api: ApiConfig {
            listen_addr: raw.api.listen_addr.unwrap_or(defaults.api.listen_addr),
            auth,
        },
        logging: LoggingConfig {
            level: raw.logging.level.unwrap_or(defaults.logging.level),
            format,
            file: raw.logging.file,
        },
        data_dir: raw.data_dir.unwrap_or(defaults.data_dir),
        collector: CollectorConfig {
            binary: c.binary,
            health_port: c.health_port.unwrap_or(defaults.collector.health_port),
            alternate_health_port: c
                .alternate_health_port
                .unwrap_or(defaults.collector.alternate_health_port),
            metrics_port: c.metrics_port.unwrap_or(defaults.collector.metrics_port),
            start_grace: c
                .start_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.collector.start_grace),
            shutdown_timeout: c
                .shutdown_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.collector.shutdown_timeout),
            drain_timeout: c
                .drain_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.collector.drain_timeout),
            stability_window: c
                .stability_window_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.collector.stability_window),
            max_restarts: c.max_restarts.unwrap_or(defaults.collector.max_restarts),
            health_probe_count: c
                .health_probe_count
                .unwrap_or(defaults.collector.health_probe_count),
        },
        remote: RemoteConfig {
            enabled: raw.remote.enabled.unwrap_or(defaults.remote.enabled),
            endpoint: raw.remote.endpoint.unwrap_or(defaults.remote.endpoint),
            fetch_timeout: raw
                .remote
                .fetch_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.remote.fetch_timeout),
        },
    })
}

/// Recognized environment variables override file values. Unknown variables
/// are ignored.
fn apply_env_overrides(config: &mut AgentConfig) {
    if let Ok(v) = std::env::var("LICENSE_KEY") {
        if !v.is_empty() {
            config.license_key = v;
        }
    }
    if let Ok(v) = std::env::var("COLLECTOR_BINARY") {
        if !v.is_empty() {
            config.collector.binary = Some(PathBuf::from(v));
        }
    }
    if let Ok(v) = std::env::var("DATA_DIR") {
        if !v.is_empty() {
            config.data_dir = PathBuf::from(v);
        }
    }
    if let Ok(v) = std::env::var("API_ADDR") {
        if !v.is_empty() {
            config.api.listen_addr = v;
        }
    }
    if let Ok(v) = std::env::var("LOG_LEVEL") {
        if !v.is_empty() {
            config.logging.level = v;
        }
    }
    if let Ok(v) = std::env::var("LOG_FORMAT") {
        match v.as_str() {
            "json" => config.logging.format = LogFormat::Json,
            "text" => config.logging.format = LogFormat::Text,
            _ => {}
        }
    }
}
