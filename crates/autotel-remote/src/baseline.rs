use autotel_domain::{BaselinePayload, HostMetadata, ServiceInfo};
use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use tracing::debug;

/// Agent version stamped into every baseline.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the baseline payload for one discovery pass. Contains inventory
/// only; credential values never appear here (discovery already redacts
/// long cmdline arguments).
pub fn build_baseline(services: Vec<ServiceInfo>) -> BaselinePayload {
    let host_id = stable_host_id();
    let hostname = System::host_name().unwrap_or_else(|| "unknown".into());
    let metadata = collect_host_metadata();
    debug!(host_id = %host_id, services = services.len(), "built baseline payload");
    BaselinePayload::new(host_id, hostname, services, metadata)
}

/// A stable per-host identifier: the machine id where available, otherwise
/// the hostname.
fn stable_host_id() -> String {
    for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
        if let Ok(id) = std::fs::read_to_string(path) {
            let id = id.trim();
            if !id.is_empty() {
                return id.to_string();
            }
        }
    }
    System::host_name().unwrap_or_else(|| "unknown".into())
}

fn collect_host_metadata() -> HostMetadata {
    let system = System::new_with_specifics(
        RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
    );
    let cpu_cores = system.physical_core_count().unwrap_or(0) as u32;
    let memory_gb = (system.total_memory() as f64) / 1_073_741_824.0;

    HostMetadata {
        os: System::long_os_version().unwrap_or_else(|| "unknown".into()),
        kernel: System::kernel_version().unwrap_or_else(|| "unknown".into()),
        cpu_cores,
        memory_gb: (memory_gb * 10.0).round() / 10.0,
        cloud_provider: detect_cloud_provider(),
        instance_type: None,
        agent_version: AGENT_VERSION.to_string(),
    }
}

/// Best-effort cloud detection from DMI vendor strings; absent off-cloud.
fn detect_cloud_provider() -> Option<String> {
    let vendor = std::fs::read_to_string("/sys/class/dmi/id/sys_vendor").ok()?;
    let vendor = vendor.trim().to_ascii_lowercase();
    if vendor.contains("amazon") {
        Some("aws".into())
    } else if vendor.contains("google") {
        Some("gcp".into())
    } else if vendor.contains("microsoft") {
        Some("azure".into())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotel_domain::BASELINE_SCHEMA_VERSION;

    #[test]
    fn baseline_carries_schema_version_and_metadata() {
        let payload = build_baseline(vec![]);
        assert_eq!(payload.schema_version, BASELINE_SCHEMA_VERSION);
        assert!(!payload.host_id.is_empty());
        assert_eq!(payload.host_metadata.agent_version, AGENT_VERSION);
    }

    #[test]
    fn baseline_json_has_no_secret_looking_fields() {
        let payload = build_baseline(vec![]);
        let json = serde_json::to_string(&payload).unwrap().to_ascii_lowercase();
        assert!(!json.contains("license"));
        assert!(!json.contains("\"password\""));
    }
}
