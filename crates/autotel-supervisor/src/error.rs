use autotel_domain::{ErrorCategory, ErrorInfo};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("collector binary could not be spawned: {0}")]
    SpawnFailed(String),

    #[error("collector did not become ready within {grace_secs} s")]
    StartTimeout { grace_secs: u64 },

    #[error("collector exited during startup (code {code:?})")]
    ExitedOnStart { code: Option<i32> },

    #[error("collector already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("no collector is running")]
    NotRunning,

    #[error("config path unreadable or empty: {0}")]
    BadConfigPath(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    pub fn to_error_info(&self) -> ErrorInfo {
        let (category, code) = match self {
            // Inability to fork is fatal; everything else is a config or
            // lifecycle condition.
            SupervisorError::SpawnFailed(_) => (ErrorCategory::Internal, "spawn_failed"),
            SupervisorError::StartTimeout { .. } => (ErrorCategory::Configuration, "start_timeout"),
            SupervisorError::ExitedOnStart { .. } => (ErrorCategory::Configuration, "exited_on_start"),
            SupervisorError::AlreadyRunning { .. } => (ErrorCategory::Internal, "already_running"),
            SupervisorError::NotRunning => (ErrorCategory::Internal, "not_running"),
            SupervisorError::BadConfigPath(_) => (ErrorCategory::Configuration, "bad_config_path"),
            SupervisorError::Io(_) => (ErrorCategory::Resource, "io"),
        };
        ErrorInfo::new(category, "supervisor", code, self.to_string())
    }
}
