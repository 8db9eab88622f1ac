use autotel_domain::{ErrorCategory, ErrorInfo};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Structural { line: usize, column: usize, message: String },

    #[error("policy violation [{rule}]: {message}")]
    Policy { rule: &'static str, message: String },

    #[error("collector rejected config (exit {exit_code}): {stderr}")]
    DryLoad { exit_code: i32, stderr: String },

    #[error("dry-load could not run: {0}")]
    DryLoadUnavailable(String),
}

impl ValidateError {
    /// Every validation failure surfaces as a non-retryable validation-
    /// category ErrorInfo carrying the config path in context.
    pub fn to_error_info(&self, path: &str) -> ErrorInfo {
        let code = match self {
            ValidateError::Structural { .. } => "structural",
            ValidateError::Policy { rule, .. } => rule,
            ValidateError::DryLoad { .. } => "dry_load",
            ValidateError::DryLoadUnavailable(_) => "dry_load_unavailable",
        };
        ErrorInfo::new(ErrorCategory::Validation, "validator", code, self.to_string())
            .with_context("path", path)
            .retryable(false)
    }
}
