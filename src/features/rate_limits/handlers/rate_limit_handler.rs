use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::{AppJson, ClientIdentity};
use crate::features::rate_limits::dtos::{
    RateLimitCheckDto, RateLimitRejectionDto, RateLimitVerdictDto,
};
use crate::features::rate_limits::middleware::{apply_rate_limit_headers, rejection_response};
use crate::features::rate_limits::services::RateLimitService;

/// Check the caller's rate limit for an action
///
/// An admitted check consumes one slot in the caller's window, exactly as a
/// guarded request would.
#[utoipa::path(
    post,
    path = "/api/rate-limits/check",
    request_body = RateLimitCheckDto,
    params(
        ("x-user-id" = Option<String>, Header, description = "Caller user id"),
        ("x-forwarded-for" = Option<String>, Header, description = "Client address chain")
    ),
    responses(
        (status = 200, description = "Request admitted", body = RateLimitVerdictDto),
        (status = 400, description = "Validation error"),
        (status = 429, description = "Rate limit exceeded", body = RateLimitRejectionDto)
    ),
    tag = "rate-limits"
)]
pub async fn check_rate_limit(
    identity: ClientIdentity,
    State(service): State<Arc<RateLimitService>>,
    AppJson(dto): AppJson<RateLimitCheckDto>,
) -> Result<Response> {
    dto.validate()
        .map_err(|e| AppError::Validation(format!("Invalid request: {}", e)))?;

    let decision = service.check(&dto.action, &identity).await;
    let now_ms = Utc::now().timestamp_millis();

    if !decision.allowed {
        return Ok(rejection_response(&decision, now_ms));
    }

    let mut response = Json(RateLimitVerdictDto::new(&dto.action, &decision)).into_response();
    apply_rate_limit_headers(response.headers_mut(), &decision, now_ms);

    Ok(response)
}
