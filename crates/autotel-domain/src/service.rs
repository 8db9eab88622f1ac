use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ── Service kinds ─────────────────────────────────────────────────────────────

/// A detectable service type. Adding a kind here plus a pattern-table entry
/// and an integration template is all that is needed to monitor a new service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Mysql,
    Postgresql,
    Redis,
    Nginx,
    Apache,
    Mongodb,
    Elasticsearch,
    Rabbitmq,
    Memcached,
    Kafka,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 10] = [
        ServiceKind::Mysql,
        ServiceKind::Postgresql,
        ServiceKind::Redis,
        ServiceKind::Nginx,
        ServiceKind::Apache,
        ServiceKind::Mongodb,
        ServiceKind::Elasticsearch,
        ServiceKind::Rabbitmq,
        ServiceKind::Memcached,
        ServiceKind::Kafka,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Mysql => "mysql",
            ServiceKind::Postgresql => "postgresql",
            ServiceKind::Redis => "redis",
            ServiceKind::Nginx => "nginx",
            ServiceKind::Apache => "apache",
            ServiceKind::Mongodb => "mongodb",
            ServiceKind::Elasticsearch => "elasticsearch",
            ServiceKind::Rabbitmq => "rabbitmq",
            ServiceKind::Memcached => "memcached",
            ServiceKind::Kafka => "kafka",
        }
    }

    pub fn parse(s: &str) -> Option<ServiceKind> {
        ServiceKind::ALL.iter().copied().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ServiceKind {
    type Err = crate::error::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceKind::parse(s).ok_or_else(|| crate::error::DomainError::UnknownServiceKind(s.into()))
    }
}

// ── Discovery signals & confidence ────────────────────────────────────────────

/// The independent signal sources a service detection can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySignal {
    Process,
    Port,
    ConfigFile,
    Package,
}

impl std::fmt::Display for DiscoverySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DiscoverySignal::Process => "process",
            DiscoverySignal::Port => "port",
            DiscoverySignal::ConfigFile => "config_file",
            DiscoverySignal::Package => "package",
        };
        write!(f, "{}", s)
    }
}

/// How many independent signals agreed on a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Confidence is a pure function of the signal count: HIGH ≥3, MEDIUM =2,
    /// else LOW.
    pub fn from_signal_count(n: usize) -> Confidence {
        match n {
            0 | 1 => Confidence::Low,
            2 => Confidence::Medium,
            _ => Confidence::High,
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Confidence::Low => "LOW",
            Confidence::Medium => "MEDIUM",
            Confidence::High => "HIGH",
        };
        write!(f, "{}", s)
    }
}

// ── Endpoints ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
    pub protocol: Protocol,
}

impl Endpoint {
    pub fn tcp(address: impl Into<String>, port: u16) -> Endpoint {
        Endpoint { address: address.into(), port, protocol: Protocol::Tcp }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

// ── ProcessInfo ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Command line with long argument values redacted.
    pub cmdline: String,
    pub user: Option<String>,
}

// ── ServiceInfo ───────────────────────────────────────────────────────────────

/// One detected service on the host. Produced exclusively by the discovery
/// engine and immutable once emitted.
///
/// Invariant: `discovered_by` is never empty and `confidence` is recomputed
/// on every mutation, so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    pub version: Option<String>,
    pub endpoints: Vec<Endpoint>,
    pub discovered_by: BTreeSet<DiscoverySignal>,
    pub confidence: Confidence,
    pub process_info: Option<ProcessInfo>,
    pub config_paths: Vec<PathBuf>,
}

impl ServiceInfo {
    pub fn new(kind: ServiceKind, signal: DiscoverySignal) -> ServiceInfo {
        let discovered_by: BTreeSet<DiscoverySignal> = [signal].into_iter().collect();
        let confidence = Confidence::from_signal_count(discovered_by.len());
        ServiceInfo {
            kind,
            version: None,
            endpoints: Vec::new(),
            discovered_by,
            confidence,
            process_info: None,
            config_paths: Vec::new(),
        }
    }

    /// Record another signal source and recompute confidence.
    pub fn add_signal(&mut self, signal: DiscoverySignal) {
        self.discovered_by.insert(signal);
        self.confidence = Confidence::from_signal_count(self.discovered_by.len());
    }

    /// Add an endpoint unless an identical one is already present.
    pub fn add_endpoint(&mut self, endpoint: Endpoint) {
        if !self.endpoints.contains(&endpoint) {
            self.endpoints.push(endpoint);
        }
    }

    /// The endpoint an integration should point its receiver at: the first
    /// one recorded (port-scan and process signals insert in listen order).
    pub fn primary_endpoint(&self) -> Option<&Endpoint> {
        self.endpoints.first()
    }
}
