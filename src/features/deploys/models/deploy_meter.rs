use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core::config::DeployConfig;
use crate::shared::constants::{
    DEFAULT_ACTOR, DEFAULT_BILLING_STATUS, DEFAULT_PLAN_TIER, DEFAULT_TIER_LIMITS, MAX_ACTOR_LEN,
    REASON_BILLING_INACTIVE, REASON_DAILY_LIMIT_EXCEEDED,
};

/// Usage of one actor on the meter's day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeterUser {
    pub count: u32,
    pub plan_tier: String,
    pub billing_status: String,
    pub last_deploy_at: Option<DateTime<Utc>>,
}

/// Per-actor deploy counts for a single UTC calendar day.
///
/// When the day changes the whole table is reset, not individual actors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployMeter {
    pub day: String,
    #[serde(default)]
    pub users: BTreeMap<String, MeterUser>,
}

impl DeployMeter {
    pub fn new(day: impl Into<String>) -> Self {
        Self {
            day: day.into(),
            users: BTreeMap::new(),
        }
    }

    /// UTC calendar date, e.g. "2026-10-16"
    pub fn day_key(now: DateTime<Utc>) -> String {
        now.format("%Y-%m-%d").to_string()
    }

    /// Reset every actor if `day` is not the meter's day
    fn roll_to(&mut self, day: &str) {
        if self.day != day {
            self.day = day.to_string();
            self.users.clear();
        }
    }

    /// Count for `actor` as it would read on `day`, without resetting anything
    pub fn used_on(&self, actor: &str, day: &str) -> u32 {
        if self.day != day {
            return 0;
        }
        self.users.get(actor).map(|u| u.count).unwrap_or(0)
    }

    /// Record one deploy for `actor` at `now`, rolling the day first. Returns the new count.
    pub fn consume(
        &mut self,
        actor: &str,
        plan_tier: &str,
        billing_status: &str,
        now: DateTime<Utc>,
    ) -> u32 {
        self.roll_to(&Self::day_key(now));

        let user = self.users.entry(actor.to_string()).or_default();
        user.count += 1;
        user.plan_tier = plan_tier.to_string();
        user.billing_status = billing_status.to_string();
        user.last_deploy_at = Some(now);
        user.count
    }
}

/// Daily deploy ceilings per plan tier
#[derive(Debug, Clone, PartialEq)]
pub struct DailyLimits {
    tiers: HashMap<String, u32>,
    /// Replaces every tier's ceiling when present
    global_override: Option<u32>,
}

impl Default for DailyLimits {
    fn default() -> Self {
        Self {
            tiers: DEFAULT_TIER_LIMITS
                .iter()
                .map(|(tier, limit)| (tier.to_string(), *limit))
                .collect(),
            global_override: None,
        }
    }
}

impl DailyLimits {
    pub fn from_config(config: &DeployConfig) -> Self {
        let mut limits = Self::default();
        for (tier, limit) in &config.tier_daily_limits {
            limits.tiers.insert(tier.clone(), *limit);
        }
        limits.global_override = config.global_daily_limit;
        limits
    }

    /// Ceiling for a normalized tier. Unknown tiers get the default tier's ceiling.
    pub fn limit_for(&self, plan_tier: &str) -> u32 {
        if let Some(global) = self.global_override {
            return global;
        }
        self.tiers
            .get(plan_tier)
            .or_else(|| self.tiers.get(DEFAULT_PLAN_TIER))
            .copied()
            .unwrap_or(0)
    }
}

/// Admission view for one actor at one moment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    pub actor: String,
    pub plan_tier: String,
    pub billing_status: String,
    pub day: String,
    pub used: u32,
    pub daily_limit: u32,
    pub remaining: u32,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl QuotaSnapshot {
    /// Evaluate admission for normalized inputs on `day`. Never mutates the meter.
    pub fn evaluate(
        meter: &DeployMeter,
        limits: &DailyLimits,
        actor: &str,
        plan_tier: &str,
        billing_status: &str,
        day: &str,
    ) -> Self {
        let daily_limit = limits.limit_for(plan_tier);
        let used = meter.used_on(actor, day);

        let (remaining, reason) = if billing_status != DEFAULT_BILLING_STATUS {
            (0, Some(REASON_BILLING_INACTIVE.to_string()))
        } else {
            let remaining = daily_limit.saturating_sub(used);
            let reason = (remaining == 0).then(|| REASON_DAILY_LIMIT_EXCEEDED.to_string());
            (remaining, reason)
        };

        Self {
            actor: actor.to_string(),
            plan_tier: plan_tier.to_string(),
            billing_status: billing_status.to_string(),
            day: day.to_string(),
            used,
            daily_limit,
            remaining,
            allowed: reason.is_none(),
            reason,
        }
    }
}

pub fn normalize_actor(raw: Option<&str>) -> String {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(actor) => actor.chars().take(MAX_ACTOR_LEN).collect(),
        None => DEFAULT_ACTOR.to_string(),
    }
}

pub fn normalize_plan_tier(raw: Option<&str>) -> String {
    match raw.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()) {
        Some(tier) if tier == "team" => "business".to_string(),
        Some(tier) => tier,
        None => DEFAULT_PLAN_TIER.to_string(),
    }
}

pub fn normalize_billing_status(raw: Option<&str>) -> String {
    raw.map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_BILLING_STATUS.to_string())
}
