use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{get_deploy_logs, get_deploy_meter, get_deploy_status, run_deploy};
use super::services::DeployControllerRegistry;
use crate::features::rate_limits::{rate_limit_middleware, RateLimitGuard, RateLimitService};

/// Action name the run route is rate limited under
pub const RUN_ACTION: &str = "deploy";

/// Create routes for deploy controllers
pub fn routes(
    registry: Arc<DeployControllerRegistry>,
    rate_limiter: Arc<RateLimitService>,
) -> Router {
    let guard = RateLimitGuard::new(rate_limiter, RUN_ACTION);

    Router::new()
        .route("/api/deploys/{target}/status", get(get_deploy_status))
        .route("/api/deploys/{target}/logs", get(get_deploy_logs))
        .route("/api/deploys/{target}/meter", get(get_deploy_meter))
        .route(
            "/api/deploys/{target}/run",
            post(run_deploy).layer(axum::middleware::from_fn_with_state(
                guard,
                rate_limit_middleware,
            )),
        )
        .with_state(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::deploys::services::{DeployControllerConfig, DeployEnvironment};
    use crate::shared::constants::CONFIRMATION_PHRASE;
    use crate::shared::test_helpers::{
        InMemoryDeployStateStore, InMemoryRateLimitStore, StaticDeployTrigger,
    };
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use std::collections::HashSet;

    fn server_with(config: DeployControllerConfig) -> TestServer {
        let config = DeployControllerConfig {
            targets: HashSet::from(["acme-site".to_string()]),
            ..config
        };
        let registry = Arc::new(DeployControllerRegistry::new(
            config,
            Arc::new(InMemoryDeployStateStore::new()),
            Arc::new(StaticDeployTrigger::local_only()),
        ));
        let rate_limiter = Arc::new(RateLimitService::new(Arc::new(
            InMemoryRateLimitStore::new(),
        )));
        TestServer::new(routes(registry, rate_limiter)).unwrap()
    }

    fn ready_server() -> TestServer {
        server_with(DeployControllerConfig {
            environment: DeployEnvironment {
                control_password: Some("pw".to_string()),
                source_control_token: Some("ghp_token".to_string()),
                source_control_repo: Some("acme/site".to_string()),
            },
            ..DeployControllerConfig::default()
        })
    }

    #[tokio::test]
    async fn test_status_of_fresh_target() {
        let server = ready_server();

        let response = server.get("/api/deploys/acme-site/status").await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["ok"], true);
        assert_eq!(body["locked"], false);
        assert!(body["lock"].is_null());
        assert_eq!(body["logs"], json!([]));
        assert!(body["lastSuccess"].is_null());
    }

    #[tokio::test]
    async fn test_invalid_target_is_rejected() {
        let server = ready_server();

        let response = server.get("/api/deploys/Acme_Site/status").await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unconfigured_target_is_not_found() {
        let server = ready_server();

        let status = server.get("/api/deploys/someone-else/status").await;
        assert_eq!(status.status_code(), StatusCode::NOT_FOUND);
        let body: Value = status.json();
        assert_eq!(body["ok"], false);

        let run = server
            .post("/api/deploys/someone-else/run")
            .json(&json!({ "confirmation": CONFIRMATION_PHRASE }))
            .await;
        assert_eq!(run.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_success_then_logs_show_release() {
        let server = ready_server();

        let response = server
            .post("/api/deploys/acme-site/run")
            .add_header("x-user-id", "dana")
            .json(&json!({
                "confirmation": CONFIRMATION_PHRASE,
                "actor": "dana",
                "summary": { "rollbackRef": "abc123" }
            }))
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.header("x-ratelimit-limit"), "10");
        let body: Value = response.json();
        assert_eq!(body["ok"], true);
        assert_eq!(body["quota"]["used"], 1);
        assert_eq!(body["quota"]["remaining"], 9);
        assert_eq!(body["deployResponse"]["status"], "local_only");
        assert_eq!(body["deployResponse"]["mode"], "manual_required");
        assert_eq!(body["lastSuccess"]["runId"], body["runId"]);

        let logs: Value = server.get("/api/deploys/acme-site/logs").await.json();
        assert_eq!(logs["locked"], false);
        assert_eq!(logs["rollbackRef"], "abc123");
        let last = logs["logs"].as_array().unwrap().last().unwrap().clone();
        assert_eq!(last["message"], "Lock released");
        assert_eq!(last["level"], "info");
    }

    #[tokio::test]
    async fn test_wrong_confirmation_is_forbidden() {
        let server = ready_server();

        let response = server
            .post("/api/deploys/acme-site/run")
            .json(&json!({ "confirmation": "ship it" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
        let body: Value = response.json();
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn test_inactive_billing_is_quota_rejected() {
        let server = ready_server();

        let response = server
            .post("/api/deploys/acme-site/run")
            .json(&json!({
                "confirmation": CONFIRMATION_PHRASE,
                "billingStatus": "past_due"
            }))
            .await;

        assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
        let body: Value = response.json();
        assert_eq!(body["ok"], false);
        assert_eq!(body["metering"]["reason"], "billing_inactive");
        assert_eq!(body["metering"]["remaining"], 0);
    }

    #[tokio::test]
    async fn test_missing_environment_is_pipeline_failure() {
        let server = server_with(DeployControllerConfig::default());

        let response = server
            .post("/api/deploys/acme-site/run")
            .json(&json!({ "confirmation": CONFIRMATION_PHRASE }))
            .await;

        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert_eq!(body["ok"], false);
        assert!(body["error"].as_str().unwrap().contains("GITHUB_TOKEN"));
        assert_eq!(body["metering"]["used"], 0);

        let meter: Value = server.get("/api/deploys/acme-site/meter").await.json();
        assert_eq!(meter["metering"]["used"], 0);
    }

    #[tokio::test]
    async fn test_meter_reads_do_not_consume() {
        let server = ready_server();

        for _ in 0..3 {
            let response = server
                .get("/api/deploys/acme-site/meter")
                .add_query_param("actor", "dana")
                .add_query_param("planTier", "starter")
                .await;
            assert_eq!(response.status_code(), StatusCode::OK);

            let body: Value = response.json();
            assert_eq!(body["ok"], true);
            assert_eq!(body["metering"]["actor"], "dana");
            assert_eq!(body["metering"]["dailyLimit"], 3);
            assert_eq!(body["metering"]["used"], 0);
            assert_eq!(body["metering"]["allowed"], true);
        }
    }

    #[tokio::test]
    async fn test_run_route_is_rate_limited() {
        let server = ready_server();

        // Forbidden runs still pass through the limiter
        for _ in 0..10 {
            let response = server
                .post("/api/deploys/acme-site/run")
                .add_header("x-user-id", "dana")
                .json(&json!({ "confirmation": "nope" }))
                .await;
            assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
        }

        let response = server
            .post("/api/deploys/acme-site/run")
            .add_header("x-user-id", "dana")
            .json(&json!({ "confirmation": CONFIRMATION_PHRASE }))
            .await;
        assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get("retry-after").is_some());
        let body: Value = response.json();
        assert_eq!(body["error"], "Rate limit exceeded");
    }
}
