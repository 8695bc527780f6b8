use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::features::rate_limits::models::{DecisionSource, RateLimitDecision, RateLimitPolicy};

#[derive(Debug, Error)]
pub enum RateLimitStoreError {
    #[error("Rate limit store query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Rate limit store unavailable: {0}")]
    Unavailable(String),
}

/// What one sliding-log check does, given the state read under the key's lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlidingLogStep {
    /// A block is already active. It is reported as-is, never extended.
    Blocked { until_ms: i64 },
    /// The window is full, so a new block starts now
    StartBlock { until_ms: i64 },
    /// Admit and record one row
    Record { remaining: u32 },
}

impl SlidingLogStep {
    /// `count` is the number of rows left in the window after pruning
    pub fn evaluate(
        count: u32,
        active_block: Option<i64>,
        policy: RateLimitPolicy,
        now_ms: i64,
    ) -> Self {
        if let Some(until_ms) = active_block {
            return Self::Blocked { until_ms };
        }

        if count >= policy.max_requests {
            return Self::StartBlock {
                until_ms: now_ms + policy.block_duration_ms,
            };
        }

        Self::Record {
            remaining: policy.max_requests - count - 1,
        }
    }

    pub fn decision(self, policy: RateLimitPolicy, now_ms: i64) -> RateLimitDecision {
        match self {
            Self::Blocked { until_ms } | Self::StartBlock { until_ms } => {
                RateLimitDecision::block(policy, until_ms, DecisionSource::Store)
            }
            Self::Record { remaining } => RateLimitDecision::allow(
                policy,
                remaining,
                now_ms + policy.window_ms,
                DecisionSource::Store,
            ),
        }
    }
}

/// Durable sliding-log rows and penalty blocks.
///
/// `check_and_record` must run prune, count, block lookup and the resulting
/// write as one unit per key, so concurrent callers cannot all read the same
/// count and all be admitted.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn check_and_record(
        &self,
        key: &str,
        policy: RateLimitPolicy,
        now_ms: i64,
    ) -> Result<RateLimitDecision, RateLimitStoreError>;

    /// Remove rows older than `older_than_ms` and blocks expired at `now_ms`, for every key
    async fn sweep(&self, older_than_ms: i64, now_ms: i64) -> Result<u64, RateLimitStoreError>;
}

/// Postgres-backed store, safe to share between horizontally scaled processes
pub struct PgRateLimitStore {
    pool: PgPool,
}

impl PgRateLimitStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitStore for PgRateLimitStore {
    async fn check_and_record(
        &self,
        key: &str,
        policy: RateLimitPolicy,
        now_ms: i64,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        let mut tx = self.pool.begin().await?;

        // Serializes every check for this key until commit, across processes
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM rate_limit_requests WHERE key = $1 AND ts_ms < $2")
            .bind(key)
            .bind(now_ms - policy.window_ms)
            .execute(&mut *tx)
            .await?;

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM rate_limit_requests WHERE key = $1")
                .bind(key)
                .fetch_one(&mut *tx)
                .await?;

        let active_block: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT blocked_until_ms
            FROM rate_limit_blocks
            WHERE key = $1
              AND blocked_until_ms > $2
            "#,
        )
        .bind(key)
        .bind(now_ms)
        .fetch_optional(&mut *tx)
        .await?;

        let count = u32::try_from(count).unwrap_or(u32::MAX);
        let step = SlidingLogStep::evaluate(count, active_block, policy, now_ms);

        match step {
            SlidingLogStep::Blocked { .. } => {}
            SlidingLogStep::StartBlock { until_ms } => {
                sqlx::query(
                    r#"
                    INSERT INTO rate_limit_blocks (key, blocked_until_ms)
                    VALUES ($1, $2)
                    ON CONFLICT (key) DO UPDATE SET blocked_until_ms = EXCLUDED.blocked_until_ms
                    "#,
                )
                .bind(key)
                .bind(until_ms)
                .execute(&mut *tx)
                .await?;

                tracing::info!(
                    "Rate limit block set for key '{}' until {} ({} requests in window)",
                    key,
                    until_ms,
                    count
                );
            }
            SlidingLogStep::Record { .. } => {
                sqlx::query("INSERT INTO rate_limit_requests (key, ts_ms) VALUES ($1, $2)")
                    .bind(key)
                    .bind(now_ms)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        Ok(step.decision(policy, now_ms))
    }

    async fn sweep(&self, older_than_ms: i64, now_ms: i64) -> Result<u64, RateLimitStoreError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query("DELETE FROM rate_limit_requests WHERE ts_ms < $1")
            .bind(older_than_ms)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let blocks = sqlx::query("DELETE FROM rate_limit_blocks WHERE blocked_until_ms <= $1")
            .bind(now_ms)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok(rows + blocks)
    }
}
