use std::path::PathBuf;

use async_trait::async_trait;
use autotel_domain::{DiscoverySignal, Endpoint, ProcessInfo, ServiceKind};

use crate::error::DiscoveryError;

/// One raw detection from a single scanner, before correlation.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub kind: ServiceKind,
    pub signal: DiscoverySignal,
    pub endpoints: Vec<Endpoint>,
    pub version: Option<String>,
    pub process_info: Option<ProcessInfo>,
    pub config_paths: Vec<PathBuf>,
}

impl Candidate {
    pub fn new(kind: ServiceKind, signal: DiscoverySignal) -> Candidate {
        Candidate {
            kind,
            signal,
            endpoints: Vec::new(),
            version: None,
            process_info: None,
            config_paths: Vec::new(),
        }
    }
}

/// What one scanner gathered. A scanner that could only partially read its
/// source returns what it has plus warnings; it does not fail the scan.
#[derive(Debug, Default, Clone)]
pub struct ScanOutcome {
    pub candidates: Vec<Candidate>,
    pub warnings: Vec<String>,
}

/// A single detection signal source. All four scanners run concurrently; a
/// failure in one is recorded as a warning and never fails the overall
/// discovery.
#[async_trait]
pub trait Scanner: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn scan(&self) -> Result<ScanOutcome, DiscoveryError>;
}
