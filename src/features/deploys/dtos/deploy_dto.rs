use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::features::deploys::models::{
    DeployLock, DeployResponse, LastSuccess, LogEntry, QuotaSnapshot,
};
use crate::features::deploys::services::{ControllerStatus, RunOutcome, RunRequest};

// =============================================================================
// STATUS
// =============================================================================

/// Current controller state, safe to poll during a run
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeployStatusDto {
    pub ok: bool,
    pub locked: bool,
    pub lock: Option<DeployLock>,
    pub logs: Vec<LogEntry>,
    pub last_success: Option<LastSuccess>,
    pub rollback_ref: Option<String>,
}

impl From<ControllerStatus> for DeployStatusDto {
    fn from(status: ControllerStatus) -> Self {
        Self {
            ok: true,
            locked: status.lock.is_some(),
            lock: status.lock,
            logs: status.logs,
            last_success: status.last_success,
            rollback_ref: status.rollback_ref,
        }
    }
}

// =============================================================================
// METER
// =============================================================================

/// Identity to evaluate the daily quota for
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct MeterQueryParams {
    /// Defaults to "admin"
    pub actor: Option<String>,
    /// free, starter, pro, business (alias team) or enterprise. Defaults to "pro"
    pub plan_tier: Option<String>,
    /// Defaults to "active"
    pub billing_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeployMeterDto {
    pub ok: bool,
    pub metering: QuotaSnapshot,
}

// =============================================================================
// RUN
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunSummaryDto {
    /// Reference to roll back to if this deploy misbehaves
    #[validate(length(max = 200, message = "Rollback ref must be at most 200 characters"))]
    pub rollback_ref: Option<String>,
}

/// Request DTO for starting a deploy
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunDeployDto {
    /// Must equal the confirmation phrase exactly
    #[serde(default)]
    pub confirmation: String,
    pub actor: Option<String>,
    pub plan_tier: Option<String>,
    pub billing_status: Option<String>,
    #[validate(nested)]
    pub summary: Option<RunSummaryDto>,
}

impl From<RunDeployDto> for RunRequest {
    fn from(dto: RunDeployDto) -> Self {
        Self {
            confirmation: dto.confirmation,
            actor: dto.actor,
            plan_tier: dto.plan_tier,
            billing_status: dto.billing_status,
            rollback_ref: dto.summary.and_then(|s| s.rollback_ref),
        }
    }
}

/// Pipeline result. Which optional fields are present depends on the outcome.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeployRunResponseDto {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<uuid::Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Quota after a successful run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaSnapshot>,
    /// Quota that rejected or accompanied a failed run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metering: Option<QuotaSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<LogEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy_response: Option<DeployResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<LastSuccess>,
    /// Lock held by the run already in progress
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<DeployLock>,
}

impl From<RunOutcome> for DeployRunResponseDto {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Success(report) => Self {
                ok: true,
                run_id: Some(report.run_id),
                quota: Some(report.metering),
                logs: Some(report.logs),
                deploy_response: Some(report.deploy_response),
                last_success: Some(report.last_success),
                ..Self::default()
            },
            RunOutcome::Conflict(lock) => Self {
                error: Some("A deploy is already in progress".to_string()),
                lock: Some(lock),
                ..Self::default()
            },
            RunOutcome::Forbidden => Self {
                error: Some("Confirmation phrase does not match".to_string()),
                ..Self::default()
            },
            RunOutcome::QuotaRejected(metering) => Self {
                error: Some(
                    metering
                        .reason
                        .clone()
                        .unwrap_or_else(|| "Deploy quota exceeded".to_string()),
                ),
                metering: Some(metering),
                ..Self::default()
            },
            RunOutcome::Failed {
                error,
                metering,
                logs,
            } => Self {
                error: Some(error),
                metering: Some(metering),
                logs: Some(logs),
                ..Self::default()
            },
        }
    }
}
