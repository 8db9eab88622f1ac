use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::state::{ApiAuth, AppState};

/// Bearer-token middleware. `/health` stays open so liveness probes work
/// without credentials; everything else requires the configured token when
/// auth is enabled.
pub async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    match state.auth.as_ref() {
        ApiAuth::Disabled => next.run(request).await,
        ApiAuth::Bearer { token } => {
            let provided = request
                .headers()
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "));
            match provided {
                Some(candidate) if candidate == token => next.run(request).await,
                _ => ApiError::unauthorized().into_response(),
            }
        }
    }
}
