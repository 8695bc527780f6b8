use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::features::rate_limits::models::{ActionClass, RateLimitDecision};

/// Request DTO for an explicit rate-limit check
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RateLimitCheckDto {
    /// Action name, e.g. "deploy", "preview" or any command verb
    #[validate(length(min = 1, max = 64, message = "Action must be 1-64 characters"))]
    pub action: String,
}

/// Response DTO for an admitted request
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitVerdictDto {
    pub ok: bool,
    pub allowed: bool,
    pub action_class: ActionClass,
    pub limit: u32,
    pub remaining: u32,
    pub window_ms: i64,
    /// Unix millis when the window frees up
    pub reset_time: i64,
}

impl RateLimitVerdictDto {
    pub fn new(action: &str, decision: &RateLimitDecision) -> Self {
        Self {
            ok: true,
            allowed: decision.allowed,
            action_class: ActionClass::from_action(action),
            limit: decision.limit,
            remaining: decision.remaining,
            window_ms: decision.window_ms,
            reset_time: decision.reset_time_ms,
        }
    }
}

/// 429 body returned when a request is rejected
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRejectionDto {
    pub ok: bool,
    pub error: String,
    /// Seconds until the block (or window) ends
    pub retry_after: u64,
    pub limit: u32,
    pub window_ms: i64,
}

impl RateLimitRejectionDto {
    pub fn new(decision: &RateLimitDecision, now_ms: i64) -> Self {
        Self {
            ok: false,
            error: "Rate limit exceeded".to_string(),
            retry_after: decision.retry_after_secs(now_ms),
            limit: decision.limit,
            window_ms: decision.window_ms,
        }
    }
}
