use std::collections::HashMap;
use std::sync::Mutex;

use crate::features::rate_limits::models::{DecisionSource, RateLimitDecision, RateLimitPolicy};

/// Counter state for one key in the in-process fallback
#[derive(Debug, Clone)]
struct WindowCounter {
    count: u32,
    window_start_ms: i64,
    window_ms: i64,
    blocked_until_ms: Option<i64>,
}

/// Fixed-window fallback used while the shared store is failing.
///
/// This intentionally differs from the store path: once a window has fully
/// elapsed the counter restarts at 1 instead of sliding. It is per-process
/// and therefore only approximate when several instances serve traffic.
#[derive(Default)]
pub struct MemoryRateLimiter {
    counters: Mutex<HashMap<String, WindowCounter>>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_at(&self, key: &str, policy: RateLimitPolicy, now_ms: i64) -> RateLimitDecision {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let counter = counters
            .entry(key.to_string())
            .or_insert_with(|| WindowCounter {
                count: 0,
                window_start_ms: now_ms,
                window_ms: policy.window_ms,
                blocked_until_ms: None,
            });

        // A block holds for its full duration regardless of further traffic
        if let Some(blocked_until) = counter.blocked_until_ms {
            if blocked_until > now_ms {
                return RateLimitDecision::block(policy, blocked_until, DecisionSource::Memory);
            }
            counter.blocked_until_ms = None;
        }

        if now_ms - counter.window_start_ms >= policy.window_ms {
            counter.count = 1;
            counter.window_start_ms = now_ms;
            counter.window_ms = policy.window_ms;
            return RateLimitDecision::allow(
                policy,
                policy.max_requests.saturating_sub(1),
                now_ms + policy.window_ms,
                DecisionSource::Memory,
            );
        }

        if counter.count >= policy.max_requests {
            let blocked_until = now_ms + policy.block_duration_ms;
            counter.blocked_until_ms = Some(blocked_until);
            return RateLimitDecision::block(policy, blocked_until, DecisionSource::Memory);
        }

        counter.count += 1;
        RateLimitDecision::allow(
            policy,
            policy.max_requests.saturating_sub(counter.count),
            counter.window_start_ms + policy.window_ms,
            DecisionSource::Memory,
        )
    }

    /// Drop counters whose window and block have both lapsed. Returns the number removed.
    pub fn sweep(&self, now_ms: i64) -> usize {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let before = counters.len();
        counters.retain(|_, counter| {
            let window_live = now_ms - counter.window_start_ms < counter.window_ms;
            let block_live = counter.blocked_until_ms.is_some_and(|until| until > now_ms);
            window_live || block_live
        });

        before - counters.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.counters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: RateLimitPolicy = RateLimitPolicy {
        window_ms: 60_000,
        max_requests: 3,
        block_duration_ms: 300_000,
    };

    #[test]
    fn test_counts_down_then_blocks() {
        let limiter = MemoryRateLimiter::new();
        let now = 1_000_000;

        let remaining: Vec<u32> = (0..3)
            .map(|_| limiter.check_at("k", POLICY, now).remaining)
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let blocked = limiter.check_at("k", POLICY, now + 10);
        assert!(!blocked.allowed);
        assert_eq!(blocked.blocked_until_ms, Some(now + 10 + 300_000));
        assert_eq!(blocked.source, DecisionSource::Memory);
    }

    #[test]
    fn test_block_is_not_extended() {
        let limiter = MemoryRateLimiter::new();
        let now = 1_000_000;
        for _ in 0..3 {
            limiter.check_at("k", POLICY, now);
        }

        let first = limiter.check_at("k", POLICY, now);
        let second = limiter.check_at("k", POLICY, now + 5_000);
        assert_eq!(first.blocked_until_ms, second.blocked_until_ms);
    }

    #[test]
    fn test_block_outlives_window() {
        let limiter = MemoryRateLimiter::new();
        let now = 1_000_000;
        for _ in 0..4 {
            limiter.check_at("k", POLICY, now);
        }

        // Window has elapsed but the block has not
        let later = limiter.check_at("k", POLICY, now + 120_000);
        assert!(!later.allowed);

        let after_block = limiter.check_at("k", POLICY, now + 300_001);
        assert!(after_block.allowed);
        assert_eq!(after_block.remaining, 2);
    }

    #[test]
    fn test_fixed_window_resets_to_one() {
        let limiter = MemoryRateLimiter::new();
        let start = 1_000_000;

        // Two hits late in the window
        limiter.check_at("k", POLICY, start);
        limiter.check_at("k", POLICY, start + 59_000);
        limiter.check_at("k", POLICY, start + 59_500);

        // A sliding log would still count the two late hits here; the fixed window does not
        let decision = limiter.check_at("k", POLICY, start + 60_000);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = MemoryRateLimiter::new();
        for _ in 0..4 {
            limiter.check_at("a", POLICY, 0);
        }
        assert!(limiter.check_at("b", POLICY, 0).allowed);
    }

    #[test]
    fn test_sweep_drops_idle_counters() {
        let limiter = MemoryRateLimiter::new();
        limiter.check_at("idle", POLICY, 0);
        for _ in 0..4 {
            limiter.check_at("blocked", POLICY, 0);
        }

        let removed = limiter.sweep(61_000);
        assert_eq!(removed, 1);
        assert_eq!(limiter.len(), 1);
    }
}
