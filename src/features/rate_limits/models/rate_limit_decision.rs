use crate::features::rate_limits::models::RateLimitPolicy;

/// Which backend produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Store,
    Memory,
}

/// Outcome of a single rate-limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub limit: u32,
    pub window_ms: i64,
    /// When the current window is expected to free up, in unix millis
    pub reset_time_ms: i64,
    /// Set while a penalty block is active
    pub blocked_until_ms: Option<i64>,
    pub source: DecisionSource,
}

impl RateLimitDecision {
    pub fn allow(
        policy: RateLimitPolicy,
        remaining: u32,
        reset_time_ms: i64,
        source: DecisionSource,
    ) -> Self {
        Self {
            allowed: true,
            remaining,
            limit: policy.max_requests,
            window_ms: policy.window_ms,
            reset_time_ms,
            blocked_until_ms: None,
            source,
        }
    }

    pub fn block(policy: RateLimitPolicy, blocked_until_ms: i64, source: DecisionSource) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            limit: policy.max_requests,
            window_ms: policy.window_ms,
            reset_time_ms: blocked_until_ms,
            blocked_until_ms: Some(blocked_until_ms),
            source,
        }
    }

    /// Whole seconds until the caller may retry, rounded up
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let until = self.blocked_until_ms.unwrap_or(self.reset_time_ms);
        let delta = (until - now_ms).max(0);
        ((delta + 999) / 1000) as u64
    }
}
