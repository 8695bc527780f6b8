use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use crate::core::error::Result as AppResult;
use crate::features::deploys::models::DeployResponse;
use crate::features::deploys::services::{
    DeployStateStore, DeployTrigger, StateSlot, TriggerRequest,
};
use crate::features::rate_limits::models::{RateLimitDecision, RateLimitPolicy};
use crate::features::rate_limits::services::rate_limit_store::SlidingLogStep;
use crate::features::rate_limits::services::{RateLimitStore, RateLimitStoreError};

// =============================================================================
// RATE LIMIT STORES
// =============================================================================

/// Rate limit store backed by plain maps.
///
/// `check_and_record` holds `key_lock` across every step and yields between
/// them, the way a transaction holding an advisory lock spans round trips.
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    key_lock: tokio::sync::Mutex<()>,
    rows: Mutex<HashMap<String, Vec<i64>>>,
    blocks: Mutex<HashMap<String, i64>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self, key: &str) -> usize {
        self.rows
            .lock()
            .unwrap()
            .get(key)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn insert_row(&self, key: &str, ts_ms: i64) {
        self.rows
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(ts_ms);
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check_and_record(
        &self,
        key: &str,
        policy: RateLimitPolicy,
        now_ms: i64,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        let _guard = self.key_lock.lock().await;

        if let Some(rows) = self.rows.lock().unwrap().get_mut(key) {
            rows.retain(|ts| *ts >= now_ms - policy.window_ms);
        }
        tokio::task::yield_now().await;

        let count = self.row_count(key) as u32;
        tokio::task::yield_now().await;

        let active_block = self
            .blocks
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .filter(|until| *until > now_ms);
        tokio::task::yield_now().await;

        let step = SlidingLogStep::evaluate(count, active_block, policy, now_ms);
        match step {
            SlidingLogStep::Blocked { .. } => {}
            SlidingLogStep::StartBlock { until_ms } => {
                self.blocks.lock().unwrap().insert(key.to_string(), until_ms);
            }
            SlidingLogStep::Record { .. } => self.insert_row(key, now_ms),
        }

        Ok(step.decision(policy, now_ms))
    }

    async fn sweep(&self, older_than_ms: i64, now_ms: i64) -> Result<u64, RateLimitStoreError> {
        let mut removed = 0;

        let mut rows = self.rows.lock().unwrap();
        for entries in rows.values_mut() {
            let before = entries.len();
            entries.retain(|ts| *ts >= older_than_ms);
            removed += (before - entries.len()) as u64;
        }
        rows.retain(|_, entries| !entries.is_empty());

        let mut blocks = self.blocks.lock().unwrap();
        let before = blocks.len();
        blocks.retain(|_, until| *until > now_ms);
        removed += (before - blocks.len()) as u64;

        Ok(removed)
    }
}

/// Store whose every call fails, to exercise the memory fallback
pub struct FailingRateLimitStore;

impl FailingRateLimitStore {
    fn offline() -> RateLimitStoreError {
        RateLimitStoreError::Unavailable("store offline".to_string())
    }
}

#[async_trait]
impl RateLimitStore for FailingRateLimitStore {
    async fn check_and_record(
        &self,
        _key: &str,
        _policy: RateLimitPolicy,
        _now_ms: i64,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        Err(Self::offline())
    }

    async fn sweep(&self, _older_than_ms: i64, _now_ms: i64) -> Result<u64, RateLimitStoreError> {
        Err(Self::offline())
    }
}

// =============================================================================
// DEPLOY STATE
// =============================================================================

#[derive(Default)]
pub struct InMemoryDeployStateStore {
    slots: Mutex<HashMap<(String, StateSlot), Value>>,
}

impl InMemoryDeployStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_raw(&self, target: &str, slot: StateSlot) -> Option<Value> {
        self.slots
            .lock()
            .unwrap()
            .get(&(target.to_string(), slot))
            .cloned()
    }
}

#[async_trait]
impl DeployStateStore for InMemoryDeployStateStore {
    async fn get(&self, target: &str, slot: StateSlot) -> AppResult<Option<Value>> {
        Ok(self.get_raw(target, slot))
    }

    async fn put(&self, target: &str, slot: StateSlot, value: Value) -> AppResult<()> {
        self.slots
            .lock()
            .unwrap()
            .insert((target.to_string(), slot), value);
        Ok(())
    }

    async fn delete(&self, target: &str, slot: StateSlot) -> AppResult<()> {
        self.slots
            .lock()
            .unwrap()
            .remove(&(target.to_string(), slot));
        Ok(())
    }
}

// =============================================================================
// DEPLOY TRIGGERS
// =============================================================================

/// Always answers with the same response
pub struct StaticDeployTrigger {
    response: DeployResponse,
}

impl StaticDeployTrigger {
    pub fn new(response: DeployResponse) -> Self {
        Self { response }
    }

    pub fn local_only() -> Self {
        Self::new(DeployResponse::local_only())
    }
}

#[async_trait]
impl DeployTrigger for StaticDeployTrigger {
    async fn trigger(&self, _request: &TriggerRequest) -> DeployResponse {
        self.response.clone()
    }
}

/// Parks inside `trigger` until released, so a run can be held mid-flight
#[derive(Default)]
pub struct BlockingDeployTrigger {
    entered: Notify,
    released: Notify,
}

impl BlockingDeployTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn wait_until_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl DeployTrigger for BlockingDeployTrigger {
    async fn trigger(&self, _request: &TriggerRequest) -> DeployResponse {
        self.entered.notify_one();
        self.released.notified().await;
        DeployResponse::local_only()
    }
}

pub struct PanickingDeployTrigger;

#[async_trait]
impl DeployTrigger for PanickingDeployTrigger {
    async fn trigger(&self, _request: &TriggerRequest) -> DeployResponse {
        panic!("remote trigger exploded")
    }
}
