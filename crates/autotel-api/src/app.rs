use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::require_auth;
use crate::handlers;
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        // Liveness / readiness
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        // Status
        .route("/v1/status", get(handlers::status))
        // Discovery
        .route("/v1/discovery", get(handlers::discovery))
        .route("/v1/discovery/preview", post(handlers::discovery_preview))
        // Config
        .route("/v1/config", get(handlers::get_config))
        .route("/v1/config/validate", post(handlers::validate_config))
        .route("/v1/config/reload", post(handlers::reload_config))
        // Auto-config toggles
        .route("/v1/autoconfig/enable", post(handlers::enable_autoconfig))
        .route("/v1/autoconfig/disable", post(handlers::disable_autoconfig))
        // Events
        .route("/v1/events", get(handlers::list_events))
        // Collector metrics proxy
        .route("/v1/metrics", get(handlers::metrics))
        // Auth middleware applies to all routes above (health is exempted
        // inside the middleware)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use autotel_discovery::{Candidate, DiscoveryEngine, DiscoveryError, ScanOutcome, Scanner};
    use autotel_domain::{DiscoverySignal, Endpoint, ServiceKind};
    use autotel_orchestrator::{EventBus, Orchestrator, OrchestratorConfig};
    use autotel_store::{DataLayout, FsVersionStore, VersionStore};
    use autotel_supervisor::stubs::AlwaysReady;
    use autotel_supervisor::{Supervisor, SupervisorConfig};
    use autotel_template::Renderer;
    use autotel_validate::{NoopDryLoader, Validator};
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::util::ServiceExt;

    struct FixtureScanner;

    #[async_trait]
    impl Scanner for FixtureScanner {
        fn name(&self) -> &'static str {
            "port"
        }
        async fn scan(&self) -> Result<ScanOutcome, DiscoveryError> {
            let mut candidate = Candidate::new(ServiceKind::Redis, DiscoverySignal::Port);
            candidate.endpoints.push(Endpoint::tcp("localhost", 6379));
            Ok(ScanOutcome { candidates: vec![candidate], warnings: vec![] })
        }
    }

    struct TestStack {
        app: Router,
        supervisor: Arc<Supervisor>,
        _dir: tempfile::TempDir,
    }

    async fn test_stack(auth: crate::state::ApiAuth) -> TestStack {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path().join("data"));
        layout.ensure().await.unwrap();

        let bin = dir.path().join("collector.sh");
        std::fs::write(&bin, "#!/bin/sh\nsleep 60\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let supervisor = Arc::new(Supervisor::new(
            SupervisorConfig {
                binary: bin,
                start_grace: Duration::from_millis(500),
                probe_interval: Duration::from_millis(10),
                stability_window: Duration::from_millis(50),
                monitor_interval: Duration::from_millis(20),
                ..SupervisorConfig::default()
            },
            Arc::new(AlwaysReady),
        ));
        let store: Arc<FsVersionStore> = Arc::new(FsVersionStore::new(layout.clone()));
        let events = Arc::new(EventBus::new());

        let engine = || DiscoveryEngine::new(vec![Arc::new(FixtureScanner) as Arc<dyn Scanner>]);

        let (orchestrator, handle) = Orchestrator::new(
            OrchestratorConfig { auto_config_enabled: false, ..OrchestratorConfig::default() },
            engine(),
            Renderer::new(),
            Validator::new(Arc::new(NoopDryLoader)),
            store.clone() as Arc<dyn VersionStore>,
            layout,
            supervisor.clone(),
            None,
            events.clone(),
        );
        tokio::spawn(orchestrator.run());

        let state = AppState {
            orchestrator: handle,
            supervisor: supervisor.clone(),
            store,
            events,
            engine: Arc::new(engine()),
            renderer: Arc::new(Renderer::new()),
            validator: Arc::new(Validator::new(Arc::new(NoopDryLoader))),
            auth: Arc::new(auth),
            metrics_url: Arc::new("http://127.0.0.1:1/metrics".into()),
            http: reqwest::Client::new(),
        };
        TestStack { app: build_app(state), supervisor, _dir: dir }
    }

    async fn get(app: &Router, uri: &str) -> axum::response::Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post_empty(app: &Router, uri: &str) -> axum::response::Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_open_even_with_bearer_auth() {
        let stack = test_stack(crate::state::ApiAuth::Bearer { token: "sekrit".into() }).await;
        assert_eq!(get(&stack.app, "/health").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn bearer_auth_rejects_missing_and_wrong_tokens() {
        let stack = test_stack(crate::state::ApiAuth::Bearer { token: "sekrit".into() }).await;
        assert_eq!(get(&stack.app, "/v1/status").await.status(), StatusCode::UNAUTHORIZED);

        let response = stack
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/v1/status")
                    .header("Authorization", "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = stack
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/v1/status")
                    .header("Authorization", "Bearer sekrit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_tracks_supervisor_state() {
        let stack = test_stack(crate::state::ApiAuth::Disabled).await;
        assert_eq!(get(&stack.app, "/ready").await.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn status_reports_collector_and_agent_sections() {
        let stack = test_stack(crate::state::ApiAuth::Disabled).await;
        let response = get(&stack.app, "/v1/status").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["collector"]["state"], "stopped");
        assert!(body["agent"].get("auto_config_enabled").is_some());
    }

    #[tokio::test]
    async fn discovery_returns_fixture_service() {
        let stack = test_stack(crate::state::ApiAuth::Disabled).await;
        let response = get(&stack.app, "/v1/discovery").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["services"][0]["type"], "redis");
    }

    #[tokio::test]
    async fn preview_renders_requested_services_without_side_effects() {
        let stack = test_stack(crate::state::ApiAuth::Disabled).await;
        let response = stack
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/discovery/preview")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"services": ["mysql"]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let config = body["config"].as_str().unwrap();
        assert!(config.contains("mysql:"));
        assert!(body["required_variables"]
            .as_array()
            .unwrap()
            .iter()
            .any(|v| v == "MYSQL_MONITOR_USER"));
    }

    #[tokio::test]
    async fn preview_rejects_unknown_service_type() {
        let stack = test_stack(crate::state::ApiAuth::Disabled).await;
        let response = stack
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/discovery/preview")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"services": ["warp-drive"]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn config_is_404_before_first_apply() {
        let stack = test_stack(crate::state::ApiAuth::Disabled).await;
        assert_eq!(get(&stack.app, "/v1/config").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn validate_accepts_rendered_config_and_rejects_garbage() {
        let stack = test_stack(crate::state::ApiAuth::Disabled).await;
        let generated = Renderer::new().render(&[], None).unwrap();

        let response = stack
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/config/validate")
                    .body(Body::from(generated.config_bytes.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["valid"], true);

        let response = stack
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/config/validate")
                    .body(Body::from("not: [valid"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["category"], "validation");
    }

    #[tokio::test]
    async fn reload_runs_an_orchestrator_iteration() {
        let stack = test_stack(crate::state::ApiAuth::Disabled).await;
        let response = post_empty(&stack.app, "/v1/config/reload").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["new_version"], 1);

        // The applied config exists now.
        assert_eq!(get(&stack.app, "/v1/config").await.status(), StatusCode::OK);
        assert_eq!(get(&stack.app, "/ready").await.status(), StatusCode::OK);

        stack.supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn autoconfig_toggles_round_trip() {
        let stack = test_stack(crate::state::ApiAuth::Disabled).await;
        let response = post_empty(&stack.app, "/v1/autoconfig/enable").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["enabled"], true);

        let response = post_empty(&stack.app, "/v1/autoconfig/disable").await;
        assert_eq!(body_json(response).await["enabled"], false);
    }

    #[tokio::test]
    async fn events_endpoint_lists_recent_events() {
        let stack = test_stack(crate::state::ApiAuth::Disabled).await;
        let response = get(&stack.app, "/v1/events?limit=10").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["events"].is_array());
    }

    #[tokio::test]
    async fn metrics_proxy_maps_unreachable_collector_to_bad_gateway() {
        let stack = test_stack(crate::state::ApiAuth::Disabled).await;
        let response = get(&stack.app, "/v1/metrics").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
