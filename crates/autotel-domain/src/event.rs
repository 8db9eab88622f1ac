use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error_info::{ErrorInfo, Severity};

// ── Lifecycle events ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Stopped,
    Reloaded,
    ConfigChanged,
    ConfigRejected,
    ConfigRolledBack,
    HealthChanged,
    Crashed,
    CrashLoop,
    SecurityViolation,
    PermissionDenied,
    RemoteUnreachable,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::Started => "started",
            EventKind::Stopped => "stopped",
            EventKind::Reloaded => "reloaded",
            EventKind::ConfigChanged => "config_changed",
            EventKind::ConfigRejected => "config_rejected",
            EventKind::ConfigRolledBack => "config_rolled_back",
            EventKind::HealthChanged => "health_changed",
            EventKind::Crashed => "crashed",
            EventKind::CrashLoop => "crash_loop",
            EventKind::SecurityViolation => "security.violation",
            EventKind::PermissionDenied => "permission_denied",
            EventKind::RemoteUnreachable => "remote_unreachable",
        };
        write!(f, "{}", s)
    }
}

/// Emitted on lifecycle transitions and consumed by the event bus, the
/// control API, and the structured log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub component: String,
    pub severity: Severity,
    pub summary: String,
    pub details: Option<Value>,
    pub error: Option<ErrorInfo>,
}

impl AgentEvent {
    pub fn new(kind: EventKind, component: impl Into<String>, summary: impl Into<String>) -> Self {
        let severity = match kind {
            EventKind::Crashed | EventKind::ConfigRolledBack => Severity::Error,
            EventKind::CrashLoop | EventKind::SecurityViolation => Severity::Critical,
            EventKind::ConfigRejected
            | EventKind::PermissionDenied
            | EventKind::RemoteUnreachable => Severity::Warning,
            _ => Severity::Info,
        };
        AgentEvent {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            component: component.into(),
            severity,
            summary: summary.into(),
            details: None,
            error: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.severity = self.severity.max(error.severity);
        self.error = Some(error);
        self
    }
}
