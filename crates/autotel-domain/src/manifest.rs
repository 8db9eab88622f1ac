use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::service::{ServiceInfo, ServiceKind};

/// Schema version literal for the baseline payload. Owned by this crate;
/// bumped only with a coordinated backend change.
pub const BASELINE_SCHEMA_VERSION: &str = "1.0";

// ── Remote manifest ───────────────────────────────────────────────────────────

/// Per-integration instruction inside a [`ConfigManifest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestIntegration {
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    pub enabled: bool,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Signed remote instruction describing which integrations to enable and
/// with what variables.
///
/// `version` is an opaque ordered identifier; only "newer than" comparisons
/// are made against it. `signature` is a base64 ECDSA P-256 signature over
/// the canonical JSON serialization of everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigManifest {
    pub version: String,
    #[serde(default)]
    pub integrations: Vec<ManifestIntegration>,
    #[serde(default)]
    pub global_variables: BTreeMap<String, String>,
    pub signature: String,
    pub signed_at: DateTime<Utc>,
    pub issuer: String,
}

impl ConfigManifest {
    /// True when `self` is strictly newer than `other_version`. Versions are
    /// opaque ordered strings; lexicographic comparison is the contract.
    pub fn is_newer_than(&self, other_version: &str) -> bool {
        self.version.as_str() > other_version
    }

    /// Variables for one integration kind, if the manifest enables it.
    pub fn integration(&self, kind: ServiceKind) -> Option<&ManifestIntegration> {
        self.integrations.iter().find(|i| i.kind == kind)
    }
}

// ── Baseline payload ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMetadata {
    pub os: String,
    pub kernel: String,
    pub cpu_cores: u32,
    pub memory_gb: f64,
    pub cloud_provider: Option<String>,
    pub instance_type: Option<String>,
    pub agent_version: String,
}

/// The host inventory reported to the remote configuration service.
/// Must never contain credentials or secret-bearing attribute values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselinePayload {
    pub schema_version: String,
    pub host_id: String,
    pub hostname: String,
    pub timestamp: DateTime<Utc>,
    pub discovered_services: Vec<ServiceInfo>,
    pub host_metadata: HostMetadata,
}

impl BaselinePayload {
    pub fn new(
        host_id: impl Into<String>,
        hostname: impl Into<String>,
        discovered_services: Vec<ServiceInfo>,
        host_metadata: HostMetadata,
    ) -> Self {
        BaselinePayload {
            schema_version: BASELINE_SCHEMA_VERSION.to_string(),
            host_id: host_id.into(),
            hostname: hostname.into(),
            timestamp: Utc::now(),
            discovered_services,
            host_metadata,
        }
    }
}
