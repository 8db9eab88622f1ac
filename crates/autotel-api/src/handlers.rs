use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use autotel_domain::{DiscoverySignal, ServiceInfo, ServiceKind};

use crate::error::ApiError;
use crate::state::AppState;

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Ready only when the supervised collector is running.
pub async fn ready(State(state): State<AppState>) -> StatusCode {
    if state.supervisor.status().state.is_running() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let collector = state.supervisor.status();
    let snapshot = state.orchestrator.snapshot();
    Json(json!({
        "collector": collector,
        "agent": {
            "auto_config_enabled": snapshot.auto_config_enabled,
            "config_version": snapshot.current_version,
            "applied_hash": snapshot.applied_hash,
            "manifest_version": snapshot.last_manifest_version,
            "last_scan_at": snapshot.last_scan_at,
            "discovery_warnings": snapshot.discovery_warnings,
            "events_dropped": state.events.dropped_count(),
        },
    }))
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Force a fresh discovery pass; no caching, no side effects.
pub async fn discovery(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let report = state
        .engine
        .discover()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(json!({
        "services": report.services,
        "generated_at": report.generated_at,
        "partial": report.partial,
        "warnings": report.warnings,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct PreviewBody {
    /// Service kinds to preview. Absent = preview against a fresh discovery.
    pub services: Option<Vec<String>>,
}

/// Render the config that WOULD be generated, without applying anything.
/// Manifest variables are not consulted here; the preview shows the
/// discovery-driven shape.
pub async fn discovery_preview(
    State(state): State<AppState>,
    body: Option<Json<PreviewBody>>,
) -> Result<Json<Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let services: Vec<ServiceInfo> = match body.services {
        Some(kinds) => {
            let mut services = Vec::with_capacity(kinds.len());
            for name in kinds {
                let kind: ServiceKind =
                    name.parse().map_err(|e: autotel_domain::DomainError| {
                        ApiError::bad_request(e.to_string())
                    })?;
                // Synthesized detections preview at integration-eligible
                // confidence.
                let mut svc = ServiceInfo::new(kind, DiscoverySignal::Process);
                svc.add_signal(DiscoverySignal::Port);
                services.push(svc);
            }
            services
        }
        None => {
            state
                .engine
                .discover()
                .await
                .map_err(|e| ApiError::internal(e.to_string()))?
                .services
        }
    };

    let generated = state
        .renderer
        .render(&services, None)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    Ok(Json(json!({
        "config": generated.as_str(),
        "content_hash": generated.content_hash,
        "templates_used": generated.templates_used,
        "required_variables": generated.required_variables,
    })))
}

// ── Config ────────────────────────────────────────────────────────────────────

/// The currently applied configuration bytes, as YAML.
pub async fn get_config(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let bytes = state
        .store
        .read_current()
        .await?
        .ok_or_else(|| ApiError::not_found("no configuration has been applied yet"))?;
    Ok(([(header::CONTENT_TYPE, "application/yaml")], bytes))
}

/// Validate a candidate configuration without applying it.
pub async fn validate_config(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    match state.validator.validate(&body).await {
        Ok(()) => Ok(Json(json!({ "valid": true }))),
        Err(e) => Err(ApiError::from_info(e.to_error_info("request_body"))),
    }
}

/// Trigger one orchestrator iteration and return its ReloadResult. The
/// iteration runs in the orchestrator's task, not here; concurrent triggers
/// coalesce.
pub async fn reload_config(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let result = state
        .orchestrator
        .force_reload()
        .await
        .ok_or_else(|| ApiError::internal("orchestrator is not running"))?;
    Ok(Json(json!(result)))
}

// ── Auto-config toggles ───────────────────────────────────────────────────────

pub async fn enable_autoconfig(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if !state.orchestrator.enable_auto_config().await {
        return Err(ApiError::internal("orchestrator is not running"));
    }
    Ok(Json(json!({ "enabled": true })))
}

pub async fn disable_autoconfig(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if !state.orchestrator.disable_auto_config().await {
        return Err(ApiError::internal("orchestrator is not running"));
    }
    Ok(Json(json!({ "enabled": false })))
}

// ── Events ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<Value> {
    let events = state.events.recent(query.limit.unwrap_or(100));
    Json(json!({ "events": events, "dropped": state.events.dropped_count() }))
}

// ── Metrics proxy ─────────────────────────────────────────────────────────────

/// Reverse-proxy to the collector's Prometheus metrics endpoint.
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .http
        .get(state.metrics_url.as_str())
        .send()
        .await
        .map_err(|e| ApiError::upstream(format!("collector metrics unreachable: {}", e)))?;
    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let body = response
        .bytes()
        .await
        .map_err(|e| ApiError::upstream(e.to_string()))?;
    Ok((status, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
