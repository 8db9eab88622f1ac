use std::sync::Arc;

use autotel_discovery::DiscoveryEngine;
use autotel_orchestrator::{EventBus, OrchestratorHandle};
use autotel_store::VersionStore;
use autotel_supervisor::Supervisor;
use autotel_template::Renderer;
use autotel_validate::Validator;

/// How the control API authenticates callers. Authorization is coarse:
/// every authenticated caller may perform every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAuth {
    Disabled,
    Bearer { token: String },
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: OrchestratorHandle,
    pub supervisor: Arc<Supervisor>,
    pub store: Arc<dyn VersionStore>,
    pub events: Arc<EventBus>,
    pub engine: Arc<DiscoveryEngine>,
    pub renderer: Arc<Renderer>,
    pub validator: Arc<Validator>,
    pub auth: Arc<ApiAuth>,
    /// Collector metrics endpoint the `/v1/metrics` proxy forwards to.
    pub metrics_url: Arc<String>,
    pub http: reqwest::Client,
}
