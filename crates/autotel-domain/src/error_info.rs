use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Categories & severities ───────────────────────────────────────────────────

/// Error categories drive propagation policy: configuration and validation
/// errors skip the tick, connection errors retry, auth failures are fatal to
/// the affected manifest, permission errors degrade but never kill anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Configuration,
    Connection,
    Auth,
    Resource,
    Data,
    Internal,
    Validation,
    Permission,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Connection => "connection",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Resource => "resource",
            ErrorCategory::Data => "data",
            ErrorCategory::Internal => "internal",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Permission => "permission",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
    Fatal,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
            Severity::Fatal => "fatal",
        };
        write!(f, "{}", s)
    }
}

// ── ErrorInfo ─────────────────────────────────────────────────────────────────

/// Every failure surfaced outside its originating component is wrapped as an
/// ErrorInfo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub component: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    pub retryable: bool,
    pub resolution: Option<String>,
}

impl ErrorInfo {
    pub fn new(
        category: ErrorCategory,
        component: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> ErrorInfo {
        let severity = match category {
            ErrorCategory::Auth => Severity::Critical,
            ErrorCategory::Permission | ErrorCategory::Data => Severity::Warning,
            _ => Severity::Error,
        };
        ErrorInfo {
            code: code.into(),
            message: message.into(),
            category,
            severity,
            component: component.into(),
            timestamp: Utc::now(),
            context: BTreeMap::new(),
            retryable: matches!(category, ErrorCategory::Connection | ErrorCategory::Resource),
            resolution: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = Some(resolution.into());
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}] {}: {}", self.component, self.category, self.code, self.message)
    }
}
