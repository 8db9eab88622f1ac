use async_trait::async_trait;
use autotel_domain::{DiscoverySignal, Endpoint};
use tracing::debug;

use crate::error::DiscoveryError;
use crate::patterns::kind_for_port;
use crate::scanner::{Candidate, ScanOutcome, Scanner};

/// Reads the kernel's listening-socket table and maps well-known ports to
/// service types. Ports are never probed.
#[derive(Debug, Default)]
pub struct PortScanner;

impl PortScanner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Scanner for PortScanner {
    fn name(&self) -> &'static str {
        "port"
    }

    async fn scan(&self) -> Result<ScanOutcome, DiscoveryError> {
        tokio::task::spawn_blocking(scan_listeners)
            .await
            .map_err(|e| DiscoveryError::ScannerFailed { scanner: "port", message: e.to_string() })?
    }
}

#[cfg(target_os = "linux")]
fn scan_listeners() -> Result<ScanOutcome, DiscoveryError> {
    use std::collections::HashMap;

    let mut outcome = ScanOutcome::default();

    let mut entries = Vec::new();
    match procfs::net::tcp() {
        Ok(v4) => entries.extend(v4),
        Err(e) => outcome.warnings.push(format!("tcp socket table unreadable: {}", e)),
    }
    match procfs::net::tcp6() {
        Ok(v6) => entries.extend(v6),
        Err(e) => outcome.warnings.push(format!("tcp6 socket table unreadable: {}", e)),
    }

    if entries.is_empty() && !outcome.warnings.is_empty() {
        return Err(DiscoveryError::PermissionDenied { what: "/proc/net/tcp".into() });
    }

    // Socket inode → owning pid, best effort. Reading other processes' fd
    // tables usually needs elevated privileges; denial just means no
    // tie-break pid on the port candidates.
    let inode_to_pid = socket_inode_owners();

    let mut seen_ports: HashMap<u16, ()> = HashMap::new();
    for entry in entries {
        if entry.state != procfs::net::TcpState::Listen {
            continue;
        }
        let port = entry.local_address.port();
        if seen_ports.insert(port, ()).is_some() {
            continue;
        }
        let Some(kind) = kind_for_port(port) else {
            continue;
        };

        let address = match entry.local_address.ip() {
            ip if ip.is_unspecified() => "localhost".to_string(),
            ip => ip.to_string(),
        };

        debug!(service = %kind, port, "port scan match");
        let mut candidate = Candidate::new(kind, DiscoverySignal::Port);
        candidate.endpoints.push(Endpoint::tcp(address, port));
        if let Some(pid) = inode_to_pid.get(&entry.inode) {
            candidate.process_info = Some(autotel_domain::ProcessInfo {
                pid: *pid,
                cmdline: String::new(),
                user: None,
            });
        }
        outcome.candidates.push(candidate);
    }

    Ok(outcome)
}

#[cfg(target_os = "linux")]
fn socket_inode_owners() -> std::collections::HashMap<u64, u32> {
    let mut map = std::collections::HashMap::new();
    let Ok(processes) = procfs::process::all_processes() else {
        return map;
    };
    for proc in processes.flatten() {
        let Ok(fds) = proc.fd() else { continue };
        for fd in fds.flatten() {
            if let procfs::process::FDTarget::Socket(inode) = fd.target {
                map.insert(inode, proc.pid as u32);
            }
        }
    }
    map
}

#[cfg(not(target_os = "linux"))]
fn scan_listeners() -> Result<ScanOutcome, DiscoveryError> {
    Ok(ScanOutcome {
        candidates: Vec::new(),
        warnings: vec!["listening-socket table not supported on this platform".into()],
    })
}
