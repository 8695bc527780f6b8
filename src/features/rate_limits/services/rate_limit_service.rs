use std::sync::Arc;

use chrono::Utc;

use crate::core::extractor::ClientIdentity;
use crate::features::rate_limits::models::{ActionClass, RateLimitDecision, RateLimitPolicy};
use crate::features::rate_limits::services::{
    MemoryRateLimiter, RateLimitStore, RateLimitStoreError,
};

/// Sliding-log rate limiter with an escalating block per (action, user, ip).
///
/// The shared store is authoritative. When it fails the check is answered by
/// the in-process fixed-window fallback so that rate limiting never fails a
/// request by itself.
pub struct RateLimitService {
    store: Arc<dyn RateLimitStore>,
    memory: MemoryRateLimiter,
}

impl RateLimitService {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            store,
            memory: MemoryRateLimiter::new(),
        }
    }

    /// Key format is `action:userId:ip`, with the action normalized
    pub fn rate_limit_key(action: &str, identity: &ClientIdentity) -> String {
        format!("{}:{}:{}", ActionClass::normalize(action), identity.user_id, identity.ip)
    }

    /// Check (and on success record) one request for `action` from `identity`
    pub async fn check(&self, action: &str, identity: &ClientIdentity) -> RateLimitDecision {
        let action = ActionClass::normalize(action);
        let policy = ActionClass::from_action(&action).policy();
        let key = Self::rate_limit_key(&action, identity);
        self.check_with_policy(&key, policy).await
    }

    pub async fn check_with_policy(&self, key: &str, policy: RateLimitPolicy) -> RateLimitDecision {
        self.check_at(key, policy, Utc::now().timestamp_millis()).await
    }

    pub async fn check_at(
        &self,
        key: &str,
        policy: RateLimitPolicy,
        now_ms: i64,
    ) -> RateLimitDecision {
        let decision = match self.store.check_and_record(key, policy, now_ms).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(
                    "Rate limit store failed for key '{}', using memory fallback: {}",
                    key,
                    e
                );
                self.memory.check_at(key, policy, now_ms)
            }
        };

        tracing::debug!(
            key = %key,
            allowed = decision.allowed,
            remaining = decision.remaining,
            source = ?decision.source,
            "Rate limit verdict"
        );

        decision
    }

    /// Purge dead rows from the store and idle counters from the fallback
    pub async fn sweep(&self, now_ms: i64) -> Result<u64, RateLimitStoreError> {
        let evicted = self.memory.sweep(now_ms);
        if evicted > 0 {
            tracing::debug!("Evicted {} idle in-memory rate limit counters", evicted);
        }

        self.store
            .sweep(now_ms - ActionClass::longest_window_ms(), now_ms)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::rate_limits::models::DecisionSource;
    use crate::shared::test_helpers::{FailingRateLimitStore, InMemoryRateLimitStore};
    use futures::future::join_all;

    const POLICY: RateLimitPolicy = RateLimitPolicy {
        window_ms: 60_000,
        max_requests: 5,
        block_duration_ms: 300_000,
    };

    fn identity() -> ClientIdentity {
        ClientIdentity {
            user_id: "user-1".to_string(),
            ip: "203.0.113.9".to_string(),
        }
    }

    #[test]
    fn test_rate_limit_key_format() {
        assert_eq!(
            RateLimitService::rate_limit_key("deploy", &identity()),
            "deploy:user-1:203.0.113.9"
        );
        assert_eq!(
            RateLimitService::rate_limit_key("plan", &ClientIdentity::anonymous()),
            "plan:anonymous:unknown"
        );
        assert_eq!(
            RateLimitService::rate_limit_key(" Deploy ", &identity()),
            "deploy:user-1:203.0.113.9"
        );
    }

    #[tokio::test]
    async fn test_concurrent_checks_never_exceed_limit() {
        let service = RateLimitService::new(Arc::new(InMemoryRateLimitStore::new()));

        let decisions = join_all((0..20).map(|_| service.check_at("k", POLICY, 1_000))).await;

        let allowed = decisions.iter().filter(|d| d.allowed).count();
        assert_eq!(allowed, 5);
        assert!(decisions.iter().all(|d| d.source == DecisionSource::Store));

        let mut remaining: Vec<u32> = decisions
            .iter()
            .filter(|d| d.allowed)
            .map(|d| d.remaining)
            .collect();
        remaining.sort_unstable();
        assert_eq!(remaining, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_action_spellings_share_one_budget() {
        let service = RateLimitService::new(Arc::new(InMemoryRateLimitStore::new()));
        let spellings = ["deploy", "Deploy", "DEPLOY", " deploy "];

        let mut allowed = 0;
        for i in 0..30 {
            let decision = service.check(spellings[i % spellings.len()], &identity()).await;
            if decision.allowed {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 10);
    }

    #[tokio::test]
    async fn test_sliding_log_counts_down_then_blocks_without_extension() {
        let service = RateLimitService::new(Arc::new(InMemoryRateLimitStore::new()));
        let now = 10_000_000;

        let mut remaining = Vec::new();
        for i in 0..5 {
            let decision = service.check_at("k", POLICY, now + i).await;
            assert!(decision.allowed);
            assert_eq!(decision.source, DecisionSource::Store);
            remaining.push(decision.remaining);
        }
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

        let sixth = service.check_at("k", POLICY, now + 10).await;
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        assert_eq!(sixth.blocked_until_ms, Some(now + 10 + 300_000));

        let seventh = service.check_at("k", POLICY, now + 20_000).await;
        assert!(!seventh.allowed);
        assert_eq!(seventh.blocked_until_ms, sixth.blocked_until_ms);
    }

    #[tokio::test]
    async fn test_window_slides_per_timestamp() {
        let service = RateLimitService::new(Arc::new(InMemoryRateLimitStore::new()));
        let policy = RateLimitPolicy {
            window_ms: 60_000,
            max_requests: 2,
            block_duration_ms: 1_000,
        };

        service.check_at("k", policy, 0).await;
        service.check_at("k", policy, 30_000).await;

        // The first row has aged out, the second has not
        let decision = service.check_at("k", policy, 60_001).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn test_block_expires() {
        let service = RateLimitService::new(Arc::new(InMemoryRateLimitStore::new()));
        for _ in 0..6 {
            service.check_at("k", POLICY, 0).await;
        }

        assert!(!service.check_at("k", POLICY, 299_999).await.allowed);
        assert!(service.check_at("k", POLICY, 300_001).await.allowed);
    }

    #[tokio::test]
    async fn test_token_class_blocks_twenty_first_call() {
        let service = RateLimitService::new(Arc::new(InMemoryRateLimitStore::new()));
        let policy = ActionClass::from_action("preview").policy();
        let now = 5_000_000;

        for _ in 0..20 {
            assert!(service.check_at("preview:u:ip", policy, now).await.allowed);
        }

        let blocked = service.check_at("preview:u:ip", policy, now).await;
        assert!(!blocked.allowed);
        assert_eq!(blocked.retry_after_secs(now), 180);
    }

    #[tokio::test]
    async fn test_store_failure_falls_back_to_memory() {
        let service = RateLimitService::new(Arc::new(FailingRateLimitStore));

        let decision = service.check_at("k", POLICY, 0).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.source, DecisionSource::Memory);

        for _ in 0..4 {
            service.check_at("k", POLICY, 0).await;
        }
        let blocked = service.check_at("k", POLICY, 0).await;
        assert!(!blocked.allowed);
        assert_eq!(blocked.source, DecisionSource::Memory);
    }

    #[tokio::test]
    async fn test_check_uses_action_table() {
        let service = RateLimitService::new(Arc::new(InMemoryRateLimitStore::new()));

        let decision = service.check("deploy", &identity()).await;
        assert_eq!(decision.limit, 10);
        assert_eq!(decision.remaining, 9);

        let decision = service.check("edit_text", &identity()).await;
        assert_eq!(decision.limit, 100);
    }

    #[tokio::test]
    async fn test_sweep_removes_aged_rows() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let service = RateLimitService::new(store.clone());

        service.check_at("a", POLICY, 0).await;
        service.check_at("b", POLICY, 400_000).await;

        let removed = service.sweep(400_000).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.row_count("a"), 0);
        assert_eq!(store.row_count("b"), 1);
    }
}
