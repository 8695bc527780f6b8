use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::features::deploys::{
    dtos as deploys_dtos, handlers as deploys_handlers, models as deploys_models,
};
use crate::features::rate_limits::{
    dtos as rate_limits_dtos, handlers as rate_limits_handlers, models as rate_limits_models,
};
use crate::shared::types::ErrorResponse;

#[derive(OpenApi)]
#[openapi(
    paths(
        // Deploys
        deploys_handlers::get_deploy_status,
        deploys_handlers::get_deploy_logs,
        deploys_handlers::get_deploy_meter,
        deploys_handlers::run_deploy,
        // Rate Limits
        rate_limits_handlers::check_rate_limit,
    ),
    components(
        schemas(
            // Shared
            ErrorResponse,
            // Deploys
            deploys_models::DeployLock,
            deploys_models::LogLevel,
            deploys_models::LogEntry,
            deploys_models::DeployTriggerStatus,
            deploys_models::DeployResponse,
            deploys_models::LastSuccess,
            deploys_models::QuotaSnapshot,
            deploys_dtos::DeployStatusDto,
            deploys_dtos::DeployMeterDto,
            deploys_dtos::RunSummaryDto,
            deploys_dtos::RunDeployDto,
            deploys_dtos::DeployRunResponseDto,
            // Rate Limits
            rate_limits_models::ActionClass,
            rate_limits_dtos::RateLimitCheckDto,
            rate_limits_dtos::RateLimitVerdictDto,
            rate_limits_dtos::RateLimitRejectionDto,
        )
    ),
    tags(
        (name = "deploys", description = "Single-flight deploy pipeline per target, with daily quotas"),
        (name = "rate-limits", description = "Per-identity request rate limiting"),
    ),
    modifiers(&CallerIdentityAddon),
    info(
        title = "Voxsite Core API",
        version = "0.1.0",
        description = "Deploy control plane and rate limiting",
    )
)]
pub struct ApiDoc;

/// Documents the header the rate limiter keys callers by
struct CallerIdentityAddon;

impl Modify for CallerIdentityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "caller_identity",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-user-id",
                    "Caller user id. Without it, callers share the anonymous bucket of their address",
                ))),
            );
        }
    }
}
