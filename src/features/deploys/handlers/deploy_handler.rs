use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::{AppJson, DeployTarget};
use crate::features::deploys::dtos::{
    DeployMeterDto, DeployRunResponseDto, DeployStatusDto, MeterQueryParams, RunDeployDto,
};
use crate::features::deploys::services::{DeployControllerRegistry, RunOutcome};

/// Get deploy controller status
#[utoipa::path(
    get,
    path = "/api/deploys/{target}/status",
    params(("target" = String, Path, description = "Deploy target slug")),
    responses(
        (status = 200, description = "Controller status", body = DeployStatusDto),
        (status = 400, description = "Invalid target"),
        (status = 404, description = "Target not configured")
    ),
    tag = "deploys"
)]
pub async fn get_deploy_status(
    DeployTarget(target): DeployTarget,
    State(registry): State<Arc<DeployControllerRegistry>>,
) -> Result<Json<DeployStatusDto>> {
    let controller = registry.get(&target).await?;
    Ok(Json(controller.status().await.into()))
}

/// Get deploy audit logs
///
/// Same payload as the status endpoint.
#[utoipa::path(
    get,
    path = "/api/deploys/{target}/logs",
    params(("target" = String, Path, description = "Deploy target slug")),
    responses(
        (status = 200, description = "Controller status with audit log", body = DeployStatusDto),
        (status = 400, description = "Invalid target"),
        (status = 404, description = "Target not configured")
    ),
    tag = "deploys"
)]
pub async fn get_deploy_logs(
    target: DeployTarget,
    state: State<Arc<DeployControllerRegistry>>,
) -> Result<Json<DeployStatusDto>> {
    get_deploy_status(target, state).await
}

/// Evaluate the daily deploy quota without consuming it
#[utoipa::path(
    get,
    path = "/api/deploys/{target}/meter",
    params(
        ("target" = String, Path, description = "Deploy target slug"),
        MeterQueryParams
    ),
    responses(
        (status = 200, description = "Quota snapshot", body = DeployMeterDto),
        (status = 400, description = "Invalid target"),
        (status = 404, description = "Target not configured")
    ),
    tag = "deploys"
)]
pub async fn get_deploy_meter(
    DeployTarget(target): DeployTarget,
    State(registry): State<Arc<DeployControllerRegistry>>,
    Query(params): Query<MeterQueryParams>,
) -> Result<Json<DeployMeterDto>> {
    let controller = registry.get(&target).await?;
    let metering = controller
        .meter(
            params.actor.as_deref(),
            params.plan_tier.as_deref(),
            params.billing_status.as_deref(),
        )
        .await;

    Ok(Json(DeployMeterDto { ok: true, metering }))
}

/// Run the deploy pipeline
///
/// Only one run executes per target at a time. Rejections never consume quota.
#[utoipa::path(
    post,
    path = "/api/deploys/{target}/run",
    params(("target" = String, Path, description = "Deploy target slug")),
    request_body = RunDeployDto,
    responses(
        (status = 200, description = "Deploy completed", body = DeployRunResponseDto),
        (status = 400, description = "Invalid target or body"),
        (status = 404, description = "Target not configured"),
        (status = 403, description = "Confirmation phrase mismatch", body = DeployRunResponseDto),
        (status = 409, description = "Deploy already in progress", body = DeployRunResponseDto),
        (status = 429, description = "Quota or rate limit exceeded", body = DeployRunResponseDto),
        (status = 500, description = "Pipeline failed", body = DeployRunResponseDto)
    ),
    tag = "deploys"
)]
pub async fn run_deploy(
    DeployTarget(target): DeployTarget,
    State(registry): State<Arc<DeployControllerRegistry>>,
    AppJson(dto): AppJson<RunDeployDto>,
) -> Result<Response> {
    dto.validate()
        .map_err(|e| AppError::Validation(format!("Invalid request: {}", e)))?;

    let controller = registry.get(&target).await?;
    tracing::info!("Deploy run requested for '{}'", controller.target());
    let outcome = controller.run(dto.into()).await;

    let status = match &outcome {
        RunOutcome::Success(_) => StatusCode::OK,
        RunOutcome::Conflict(_) => StatusCode::CONFLICT,
        RunOutcome::Forbidden => StatusCode::FORBIDDEN,
        RunOutcome::QuotaRejected(_) => StatusCode::TOO_MANY_REQUESTS,
        RunOutcome::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    Ok((status, Json(DeployRunResponseDto::from(outcome))).into_response())
}
