use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeployTriggerStatus {
    /// Remote triggering is disabled by configuration
    LocalOnly,
    /// Remote credentials are not configured
    Skipped,
    Triggered,
    /// The remote endpoint answered non-2xx or could not be reached
    RequiresManual,
}

/// What happened when the pipeline tried to start the remote deploy.
///
/// Every variant is a successful pipeline outcome; only `Triggered` means no
/// manual follow-up is needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    pub status: DeployTriggerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub body: Option<serde_json::Value>,
}

impl DeployResponse {
    pub fn local_only() -> Self {
        Self {
            status: DeployTriggerStatus::LocalOnly,
            mode: Some("manual_required".to_string()),
            message: "Remote deploy triggering is disabled; deploy manually".to_string(),
            http_status: None,
            missing: Vec::new(),
            body: None,
        }
    }

    pub fn skipped(missing: Vec<String>) -> Self {
        Self {
            status: DeployTriggerStatus::Skipped,
            mode: Some("manual".to_string()),
            message: format!("Remote deploy credentials missing: {}", missing.join(", ")),
            http_status: None,
            missing,
            body: None,
        }
    }

    pub fn triggered(http_status: u16, body: Option<serde_json::Value>) -> Self {
        Self {
            status: DeployTriggerStatus::Triggered,
            mode: None,
            message: "Remote deploy triggered".to_string(),
            http_status: Some(http_status),
            missing: Vec::new(),
            body,
        }
    }

    pub fn requires_manual(
        http_status: Option<u16>,
        body: Option<serde_json::Value>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: DeployTriggerStatus::RequiresManual,
            mode: Some("manual".to_string()),
            message: message.into(),
            http_status,
            missing: Vec::new(),
            body,
        }
    }
}

/// Most recent completed deploy on a controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LastSuccess {
    pub run_id: Uuid,
    pub ts: DateTime<Utc>,
    pub deploy_response: DeployResponse,
}
