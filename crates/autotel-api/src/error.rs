use autotel_domain::{ErrorCategory, ErrorInfo};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors leave the API as JSON ErrorInfo bodies with the HTTP status mapped
/// from the error category.
pub struct ApiError {
    pub status: StatusCode,
    pub info: ErrorInfo,
}

pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Configuration => StatusCode::BAD_REQUEST,
        ErrorCategory::Auth => StatusCode::UNAUTHORIZED,
        ErrorCategory::Resource => StatusCode::NOT_FOUND,
        ErrorCategory::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCategory::Connection => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn from_info(info: ErrorInfo) -> Self {
        ApiError { status: status_for(info.category), info }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::from_info(ErrorInfo::new(ErrorCategory::Resource, "api", "not_found", message))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::from_info(ErrorInfo::new(ErrorCategory::Configuration, "api", "bad_request", message))
    }

    pub fn unauthorized() -> Self {
        Self::from_info(ErrorInfo::new(
            ErrorCategory::Auth,
            "api",
            "unauthorized",
            "missing or invalid credentials",
        ))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::from_info(ErrorInfo::new(ErrorCategory::Internal, "api", "internal", message))
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::from_info(ErrorInfo::new(
            ErrorCategory::Connection,
            "api",
            "upstream_unreachable",
            message,
        ))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.info }))).into_response()
    }
}

impl From<autotel_store::StoreError> for ApiError {
    fn from(e: autotel_store::StoreError) -> Self {
        ApiError::internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_status_mapping() {
        assert_eq!(status_for(ErrorCategory::Configuration), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorCategory::Auth), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(ErrorCategory::Resource), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorCategory::Validation), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(ErrorCategory::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
