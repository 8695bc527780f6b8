use serde::Serialize;
use utoipa::ToSchema;

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;

/// Limits applied to one action class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window_ms: i64,
    pub max_requests: u32,
    pub block_duration_ms: i64,
}

/// Bucket an action name falls into. The table is fixed; callers cannot pick a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    /// apply, deploy, rollback
    Heavy,
    /// preview, plan
    Token,
    Auto,
    Default,
}

impl ActionClass {
    /// Canonical spelling of an action name, shared by the class lookup and the key
    pub fn normalize(action: &str) -> String {
        action.trim().to_ascii_lowercase()
    }

    pub fn from_action(action: &str) -> Self {
        match Self::normalize(action).as_str() {
            "apply" | "deploy" | "rollback" => ActionClass::Heavy,
            "preview" | "plan" => ActionClass::Token,
            "auto" => ActionClass::Auto,
            _ => ActionClass::Default,
        }
    }

    pub fn policy(self) -> RateLimitPolicy {
        match self {
            ActionClass::Heavy => RateLimitPolicy {
                window_ms: 5 * MINUTE_MS,
                max_requests: 10,
                block_duration_ms: 15 * MINUTE_MS,
            },
            ActionClass::Token => RateLimitPolicy {
                window_ms: MINUTE_MS,
                max_requests: 20,
                block_duration_ms: 3 * MINUTE_MS,
            },
            ActionClass::Auto => RateLimitPolicy {
                window_ms: 5 * MINUTE_MS,
                max_requests: 5,
                block_duration_ms: 10 * MINUTE_MS,
            },
            ActionClass::Default => RateLimitPolicy {
                window_ms: MINUTE_MS,
                max_requests: 100,
                block_duration_ms: 5 * MINUTE_MS,
            },
        }
    }

    pub fn all() -> [ActionClass; 4] {
        [
            ActionClass::Heavy,
            ActionClass::Token,
            ActionClass::Auto,
            ActionClass::Default,
        ]
    }

    /// Longest window across the table; rows older than this are dead for every class
    pub fn longest_window_ms() -> i64 {
        Self::all()
            .iter()
            .map(|class| class.policy().window_ms)
            .max()
            .unwrap_or(MINUTE_MS)
    }
}
