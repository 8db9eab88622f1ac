pub mod error;
pub mod error_info;
pub mod event;
pub mod hash;
pub mod manifest;
pub mod service;
pub mod status;
pub mod version;


pub use error::DomainError;
pub use error_info::{ErrorCategory, ErrorInfo, Severity};
pub use event::{AgentEvent, EventKind};
pub use hash::{canonical_json_bytes, content_hash, sort_json_keys};
pub use manifest::{
    BaselinePayload, ConfigManifest, HostMetadata, ManifestIntegration, BASELINE_SCHEMA_VERSION,
};
pub use service::{
    Confidence, DiscoverySignal, Endpoint, ProcessInfo, Protocol, ServiceInfo, ServiceKind,
};
pub use status::{
    CollectorState, CollectorStatus, ReloadResult, ReloadResultBuilder, ReloadStrategy,
    ResourceMetrics, RollbackInfo,
};
pub use version::{ConfigSource, ConfigVersionRecord, GeneratedConfig, PROCESSOR_ORDER};
