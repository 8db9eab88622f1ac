use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Raw YAML representation of the agent configuration file.
///
/// The top-level key set is closed: unknown keys are a parse error, so a
/// typoed section fails loudly instead of being silently ignored.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub license_key: Option<String>,
    #[serde(default)]
    pub service: RawService,
    #[serde(default)]
    pub auto_config: RawAutoConfig,
    #[serde(default)]
    pub api: RawApi,
    #[serde(default)]
    pub logging: RawLogging,
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub collector: RawCollector,
    #[serde(default)]
    pub remote: RawRemote,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawService {
    pub name: Option<String>,
    pub environment: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Default for RawService {
    fn default() -> Self {
        RawService { name: None, environment: None, tags: BTreeMap::new() }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawAutoConfig {
    pub enabled: Option<bool>,
    /// Seconds between orchestrator scans.
    pub scan_interval: Option<u64>,
}

impl Default for RawAutoConfig {
    fn default() -> Self {
        RawAutoConfig { enabled: None, scan_interval: None }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawApi {
    pub listen_addr: Option<String>,
    pub auth: Option<RawApiAuth>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawApiAuth {
    /// "disabled" or "bearer".
    pub mode: String,
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawLogging {
    pub level: Option<String>,
    /// "text" or "json".
    pub format: Option<String>,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawCollector {
    /// Path to the collector binary. Absent = search PATH.
    pub binary: Option<PathBuf>,
    pub health_port: Option<u16>,
    /// Health/admin port for the incoming instance during a blue-green window.
    pub alternate_health_port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub start_grace_secs: Option<u64>,
    pub shutdown_timeout_secs: Option<u64>,
    pub drain_timeout_secs: Option<u64>,
    pub stability_window_secs: Option<u64>,
    pub max_restarts: Option<u32>,
    pub health_probe_count: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawRemote {
    pub enabled: Option<bool>,
    pub endpoint: Option<String>,
    pub fetch_timeout_secs: Option<u64>,
}
