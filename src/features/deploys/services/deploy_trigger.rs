use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::core::config::RemoteDeployConfig;
use crate::features::deploys::models::DeployResponse;

/// What the remote side needs to know about a run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub run_id: Uuid,
    pub target: String,
    pub actor: String,
    pub plan_tier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

/// Starts the production deploy once admission has passed.
///
/// Implementations never fail: every problem degrades to a manual result.
#[async_trait]
pub trait DeployTrigger: Send + Sync {
    async fn trigger(&self, request: &TriggerRequest) -> DeployResponse;
}

/// Triggers a deployment through the hosting provider's HTTP API
pub struct RemoteDeployTrigger {
    config: RemoteDeployConfig,
    client: reqwest::Client,
}

impl RemoteDeployTrigger {
    pub fn new(config: RemoteDeployConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn missing_credentials(&self) -> Vec<String> {
        [
            ("REMOTE_DEPLOY_ACCOUNT_ID", &self.config.account_id),
            ("REMOTE_DEPLOY_API_TOKEN", &self.config.api_token),
            ("REMOTE_DEPLOY_SCRIPT", &self.config.script_name),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name.to_string())
        .collect()
    }
}

#[async_trait]
impl DeployTrigger for RemoteDeployTrigger {
    async fn trigger(&self, request: &TriggerRequest) -> DeployResponse {
        if !self.config.enabled {
            return DeployResponse::local_only();
        }

        let (account_id, api_token, script_name) = match (
            &self.config.account_id,
            &self.config.api_token,
            &self.config.script_name,
        ) {
            (Some(account), Some(token), Some(script)) => (account, token, script),
            _ => return DeployResponse::skipped(self.missing_credentials()),
        };

        let url = format!(
            "{}/accounts/{}/workers/scripts/{}/deployments",
            self.config.api_base.trim_end_matches('/'),
            account_id,
            script_name
        );

        tracing::info!("Triggering remote deploy for run {} at {}", request.run_id, url);

        let mut call = self.client.post(&url).bearer_auth(api_token).json(request);
        if let Some(timeout) = self.config.timeout {
            call = call.timeout(timeout);
        }

        let response = match call.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Remote deploy request failed for run {}: {}", request.run_id, e);
                return DeployResponse::requires_manual(
                    None,
                    None,
                    format!("Remote deploy request failed: {}", e),
                );
            }
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body = if text.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(&text)
                    .unwrap_or_else(|_| serde_json::Value::String(text.clone())),
            )
        };

        if status.is_success() {
            DeployResponse::triggered(status.as_u16(), body)
        } else {
            tracing::warn!(
                "Remote deploy for run {} answered HTTP {}",
                request.run_id,
                status
            );
            DeployResponse::requires_manual(
                Some(status.as_u16()),
                body,
                format!("Remote deploy answered HTTP {}; deploy manually", status),
            )
        }
    }
}
