use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Marker that a deploy pipeline is running on a controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeployLock {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub actor: String,
    pub plan_tier: String,
}

impl DeployLock {
    pub fn new(actor: &str, plan_tier: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at,
            actor: actor.to_string(),
            plan_tier: plan_tier.to_string(),
        }
    }
}
