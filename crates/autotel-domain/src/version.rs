use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::content_hash;

/// The fixed processor chain every rendered pipeline runs, in order. The
/// renderer emits it and the validator rejects any deviation.
pub const PROCESSOR_ORDER: [&str; 6] =
    ["memory_limiter", "security", "enrichment", "transform", "cardinality_cap", "batch"];

// ── Generated configuration ───────────────────────────────────────────────────

/// Output of one renderer invocation. Owned by the renderer for the duration
/// of a single orchestrator tick; the supervisor only ever sees the bytes
/// after they have been validated and written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedConfig {
    pub config_bytes: Vec<u8>,
    /// SHA-256 hex digest of `config_bytes`.
    pub content_hash: String,
    pub templates_used: Vec<String>,
    /// Environment variable names referenced via `${env:…}` passthroughs.
    pub required_variables: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl GeneratedConfig {
    pub fn new(
        config_bytes: Vec<u8>,
        templates_used: Vec<String>,
        required_variables: Vec<String>,
    ) -> Self {
        let content_hash = content_hash(&config_bytes);
        GeneratedConfig {
            config_bytes,
            content_hash,
            templates_used,
            required_variables,
            generated_at: Utc::now(),
        }
    }

    pub fn as_str(&self) -> &str {
        // Rendered configs are assembled from UTF-8 templates.
        std::str::from_utf8(&self.config_bytes).unwrap_or("")
    }
}

// ── Version records ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Initial,
    Auto,
    Api,
    Rollback,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConfigSource::Initial => "initial",
            ConfigSource::Auto => "auto",
            ConfigSource::Api => "api",
            ConfigSource::Rollback => "rollback",
        };
        write!(f, "{}", s)
    }
}

/// Bookkeeping for one successfully applied configuration version. The
/// version number is a locally assigned, monotonically increasing integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigVersionRecord {
    pub version: u64,
    pub hash: String,
    pub applied_at: DateTime<Utc>,
    pub source: ConfigSource,
    pub author: Option<String>,
    pub description: Option<String>,
    pub size: u64,
}

impl ConfigVersionRecord {
    pub fn new(version: u64, generated: &GeneratedConfig, source: ConfigSource) -> Self {
        ConfigVersionRecord {
            version,
            hash: generated.content_hash.clone(),
            applied_at: Utc::now(),
            source,
            author: None,
            description: None,
            size: generated.config_bytes.len() as u64,
        }
    }
}
