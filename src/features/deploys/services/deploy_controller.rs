use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};

use crate::core::config::DeployConfig;
use crate::core::error::Result;
use crate::features::deploys::error::PipelineError;
use crate::features::deploys::models::{
    normalize_actor, normalize_billing_status, normalize_plan_tier, DailyLimits, DeployLock,
    DeployMeter, DeployResponse, DeployTriggerStatus, LastSuccess, LogEntry, LogLevel, LogRing,
    QuotaSnapshot,
};
use crate::features::deploys::services::{
    load_slot, save_slot, DeployStateStore, DeployTrigger, StateSlot, TriggerRequest,
};
use crate::shared::constants::{CONFIRMATION_PHRASE, LOG_LIMIT, RUN_LOG_TAIL};

/// Secrets the pipeline refuses to run without
#[derive(Debug, Clone, Default)]
pub struct DeployEnvironment {
    pub control_password: Option<String>,
    pub source_control_token: Option<String>,
    pub source_control_repo: Option<String>,
}

impl DeployEnvironment {
    /// Names of every required variable that is absent
    pub fn missing(&self) -> Vec<String> {
        [
            ("CONTROL_PASSWORD", &self.control_password),
            ("GITHUB_TOKEN", &self.source_control_token),
            ("GITHUB_REPO", &self.source_control_repo),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
        .map(|(name, _)| name.to_string())
        .collect()
    }
}

/// Per-controller settings, injected rather than read from globals
#[derive(Debug, Clone)]
pub struct DeployControllerConfig {
    pub confirmation_phrase: String,
    pub log_limit: usize,
    pub log_tail: usize,
    pub limits: DailyLimits,
    pub environment: DeployEnvironment,
    /// Targets a registry will load controllers for
    pub targets: HashSet<String>,
}

impl Default for DeployControllerConfig {
    fn default() -> Self {
        Self {
            confirmation_phrase: CONFIRMATION_PHRASE.to_string(),
            log_limit: LOG_LIMIT,
            log_tail: RUN_LOG_TAIL,
            limits: DailyLimits::default(),
            environment: DeployEnvironment::default(),
            targets: HashSet::new(),
        }
    }
}

impl DeployControllerConfig {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            limits: DailyLimits::from_config(config),
            environment: DeployEnvironment {
                control_password: config.control_password.clone(),
                source_control_token: config.source_control_token.clone(),
                source_control_repo: config.source_control_repo.clone(),
            },
            targets: config.targets.iter().cloned().collect(),
            ..Self::default()
        }
    }
}

/// Inputs to one pipeline run, before normalization
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub confirmation: String,
    pub actor: Option<String>,
    pub plan_tier: Option<String>,
    pub billing_status: Option<String>,
    pub rollback_ref: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub metering: QuotaSnapshot,
    pub logs: Vec<LogEntry>,
    pub deploy_response: DeployResponse,
    pub last_success: LastSuccess,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Success(Box<RunReport>),
    /// Another run holds the lock
    Conflict(DeployLock),
    /// Confirmation phrase did not match
    Forbidden,
    QuotaRejected(QuotaSnapshot),
    Failed {
        error: String,
        metering: QuotaSnapshot,
        logs: Vec<LogEntry>,
    },
}

/// Read-only view of a controller
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub lock: Option<DeployLock>,
    pub logs: Vec<LogEntry>,
    pub last_success: Option<LastSuccess>,
    pub rollback_ref: Option<String>,
}

struct ControllerState {
    lock: Option<DeployLock>,
    logs: LogRing,
    last_success: Option<LastSuccess>,
    rollback_ref: Option<String>,
    meter: DeployMeter,
}

/// Single-flight deploy coordinator for one target.
///
/// `pipeline` serializes whole runs, so the lock and meter read-modify-write
/// sequence never interleaves with another run on the same target. `state`
/// is only held for short sections, which keeps status and meter reads
/// available while a run is waiting on the network.
pub struct DeployController {
    target: String,
    config: Arc<DeployControllerConfig>,
    store: Arc<dyn DeployStateStore>,
    trigger: Arc<dyn DeployTrigger>,
    pipeline: Mutex<()>,
    state: RwLock<ControllerState>,
}

impl DeployController {
    /// Load persisted state for `target`. No call can reach the controller before this returns.
    pub async fn load(
        target: &str,
        config: Arc<DeployControllerConfig>,
        store: Arc<dyn DeployStateStore>,
        trigger: Arc<dyn DeployTrigger>,
    ) -> Result<Self> {
        let lock: Option<DeployLock> = load_slot(store.as_ref(), target, StateSlot::Lock).await?;
        let logs: Vec<LogEntry> = load_slot(store.as_ref(), target, StateSlot::Logs)
            .await?
            .unwrap_or_default();
        let last_success = load_slot(store.as_ref(), target, StateSlot::LastSuccess).await?;
        let rollback_ref = load_slot(store.as_ref(), target, StateSlot::RollbackRef).await?;
        let meter = load_slot(store.as_ref(), target, StateSlot::DeployMeter)
            .await?
            .unwrap_or_else(|| DeployMeter::new(DeployMeter::day_key(Utc::now())));

        let controller = Self {
            target: target.to_string(),
            state: RwLock::new(ControllerState {
                lock: None,
                logs: LogRing::from_entries(logs, config.log_limit),
                last_success,
                rollback_ref,
                meter,
            }),
            config,
            store,
            trigger,
            pipeline: Mutex::new(()),
        };

        // A persisted lock on load means the process stopped mid-run
        if let Some(stale) = lock {
            controller
                .log(
                    LogLevel::Warn,
                    "Stale lock cleared on load",
                    Some(json!({ "runId": stale.run_id, "startedAt": stale.started_at })),
                )
                .await;
            controller.store.delete(&controller.target, StateSlot::Lock).await?;
        }

        tracing::info!("Deploy controller loaded for target '{}'", controller.target);
        Ok(controller)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub async fn status(&self) -> ControllerStatus {
        let state = self.state.read().await;
        ControllerStatus {
            lock: state.lock.clone(),
            logs: state.logs.to_vec(),
            last_success: state.last_success.clone(),
            rollback_ref: state.rollback_ref.clone(),
        }
    }

    /// Current admission snapshot for the given identity. Consumes nothing.
    pub async fn meter(
        &self,
        actor: Option<&str>,
        plan_tier: Option<&str>,
        billing_status: Option<&str>,
    ) -> QuotaSnapshot {
        let actor = normalize_actor(actor);
        let plan_tier = normalize_plan_tier(plan_tier);
        let billing_status = normalize_billing_status(billing_status);
        let day = DeployMeter::day_key(Utc::now());

        let state = self.state.read().await;
        QuotaSnapshot::evaluate(
            &state.meter,
            &self.config.limits,
            &actor,
            &plan_tier,
            &billing_status,
            &day,
        )
    }

    /// Run the deploy pipeline. Every path that acquires the lock releases it.
    pub async fn run(&self, request: RunRequest) -> RunOutcome {
        if let Some(lock) = self.current_lock().await {
            tracing::warn!(
                "Deploy rejected for '{}': run {} in progress",
                self.target,
                lock.run_id
            );
            return RunOutcome::Conflict(lock);
        }

        let _serial = self.pipeline.lock().await;

        if let Some(lock) = self.current_lock().await {
            return RunOutcome::Conflict(lock);
        }

        if request.confirmation != self.config.confirmation_phrase {
            tracing::warn!("Deploy rejected for '{}': confirmation mismatch", self.target);
            return RunOutcome::Forbidden;
        }

        let actor = normalize_actor(request.actor.as_deref());
        let plan_tier = normalize_plan_tier(request.plan_tier.as_deref());
        let billing_status = normalize_billing_status(request.billing_status.as_deref());
        let now = Utc::now();
        let day = DeployMeter::day_key(now);

        let mut metering = {
            let state = self.state.read().await;
            QuotaSnapshot::evaluate(
                &state.meter,
                &self.config.limits,
                &actor,
                &plan_tier,
                &billing_status,
                &day,
            )
        };

        if !metering.allowed {
            self.log(
                LogLevel::Warn,
                "Deploy rejected by quota",
                Some(json!({
                    "actor": actor,
                    "planTier": plan_tier,
                    "reason": metering.reason,
                    "used": metering.used,
                    "dailyLimit": metering.daily_limit,
                })),
            )
            .await;
            return RunOutcome::QuotaRejected(metering);
        }

        let lock = DeployLock::new(&actor, &plan_tier, now);
        self.state.write().await.lock = Some(lock.clone());

        let body = AssertUnwindSafe(self.execute(&lock, &billing_status, &request, &mut metering))
            .catch_unwind()
            .await;

        let outcome = match body {
            Ok(Ok((deploy_response, last_success))) => Ok((deploy_response, last_success)),
            Ok(Err(e)) => Err(e),
            Err(panic) => Err(PipelineError::Panicked(panic_message(panic.as_ref()))),
        };

        if let Err(e) = &outcome {
            tracing::error!("Deploy run {} for '{}' failed: {}", lock.run_id, self.target, e);
            self.log(
                LogLevel::Error,
                "Deploy pipeline failed",
                Some(json!({ "runId": lock.run_id, "error": e.to_string() })),
            )
            .await;
        }

        self.release_lock(&lock).await;
        let logs = self.log_tail().await;

        match outcome {
            Ok((deploy_response, last_success)) => RunOutcome::Success(Box::new(RunReport {
                run_id: lock.run_id,
                metering,
                logs,
                deploy_response,
                last_success,
            })),
            Err(e) => RunOutcome::Failed {
                error: e.to_string(),
                metering,
                logs,
            },
        }
    }

    /// Pipeline steps that run while the lock is held
    async fn execute(
        &self,
        lock: &DeployLock,
        billing_status: &str,
        request: &RunRequest,
        metering: &mut QuotaSnapshot,
    ) -> std::result::Result<(DeployResponse, LastSuccess), PipelineError> {
        save_slot(self.store.as_ref(), &self.target, StateSlot::Lock, lock).await?;
        self.log(
            LogLevel::Info,
            "Lock acquired",
            Some(json!({ "runId": lock.run_id, "actor": lock.actor, "planTier": lock.plan_tier })),
        )
        .await;

        // Checked before consuming so a misconfigured environment costs no quota
        let missing = self.config.environment.missing();
        if !missing.is_empty() {
            return Err(PipelineError::Configuration { missing });
        }

        let meter = {
            let mut state = self.state.write().await;
            state
                .meter
                .consume(&lock.actor, &lock.plan_tier, billing_status, Utc::now());
            *metering = QuotaSnapshot::evaluate(
                &state.meter,
                &self.config.limits,
                &lock.actor,
                &lock.plan_tier,
                billing_status,
                &state.meter.day,
            );
            state.meter.clone()
        };
        save_slot(self.store.as_ref(), &self.target, StateSlot::DeployMeter, &meter).await?;
        self.log(
            LogLevel::Info,
            "Deploy quota consumed",
            Some(json!({
                "actor": lock.actor,
                "used": metering.used,
                "remaining": metering.remaining,
                "dailyLimit": metering.daily_limit,
            })),
        )
        .await;

        self.log(
            LogLevel::Info,
            "Verification and commit are handled by the caller before this run",
            None,
        )
        .await;

        let trigger_request = TriggerRequest {
            run_id: lock.run_id,
            target: self.target.clone(),
            actor: lock.actor.clone(),
            plan_tier: lock.plan_tier.clone(),
            repo: self.config.environment.source_control_repo.clone(),
        };
        let deploy_response = self.trigger.trigger(&trigger_request).await;
        let level = if deploy_response.status == DeployTriggerStatus::RequiresManual {
            LogLevel::Warn
        } else {
            LogLevel::Info
        };
        self.log(
            level,
            deploy_response.message.clone(),
            Some(json!({ "runId": lock.run_id, "status": deploy_response.status })),
        )
        .await;

        let last_success = LastSuccess {
            run_id: lock.run_id,
            ts: Utc::now(),
            deploy_response: deploy_response.clone(),
        };
        save_slot(
            self.store.as_ref(),
            &self.target,
            StateSlot::LastSuccess,
            &last_success,
        )
        .await?;
        self.state.write().await.last_success = Some(last_success.clone());

        if let Some(rollback_ref) = request.rollback_ref.as_deref().filter(|r| !r.is_empty()) {
            save_slot(
                self.store.as_ref(),
                &self.target,
                StateSlot::RollbackRef,
                &rollback_ref,
            )
            .await?;
            self.state.write().await.rollback_ref = Some(rollback_ref.to_string());
        }

        self.log(
            LogLevel::Info,
            "Deploy pipeline succeeded",
            Some(json!({ "runId": lock.run_id })),
        )
        .await;

        Ok((deploy_response, last_success))
    }

    async fn current_lock(&self) -> Option<DeployLock> {
        self.state.read().await.lock.clone()
    }

    /// Clear the in-memory lock first so a failing store can never leave it held
    async fn release_lock(&self, lock: &DeployLock) {
        self.state.write().await.lock = None;

        if let Err(e) = self.store.delete(&self.target, StateSlot::Lock).await {
            tracing::error!(
                "Failed to clear persisted lock for run {} on '{}': {}",
                lock.run_id,
                self.target,
                e
            );
        }

        self.log(
            LogLevel::Info,
            "Lock released",
            Some(json!({ "runId": lock.run_id })),
        )
        .await;
    }

    async fn log_tail(&self) -> Vec<LogEntry> {
        self.state.read().await.logs.tail(self.config.log_tail)
    }

    /// Append to the audit ring and persist it. Persistence failures are reported, not raised.
    async fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) {
        let entry = LogEntry::new(level, message, data);
        match level {
            LogLevel::Info => tracing::info!(target_site = %self.target, "{}", entry.message),
            LogLevel::Warn => tracing::warn!(target_site = %self.target, "{}", entry.message),
            LogLevel::Error => tracing::error!(target_site = %self.target, "{}", entry.message),
        }

        let entries = {
            let mut state = self.state.write().await;
            state.logs.push(entry);
            state.logs.to_vec()
        };

        if let Err(e) =
            save_slot(self.store.as_ref(), &self.target, StateSlot::Logs, &entries).await
        {
            tracing::error!("Failed to persist deploy logs for '{}': {}", self.target, e);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
