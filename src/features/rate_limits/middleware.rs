use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;

use crate::core::extractor::ClientIdentity;
use crate::features::rate_limits::dtos::RateLimitRejectionDto;
use crate::features::rate_limits::models::RateLimitDecision;
use crate::features::rate_limits::services::RateLimitService;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Middleware state: which limiter to consult and which action the guarded route performs
#[derive(Clone)]
pub struct RateLimitGuard {
    service: Arc<RateLimitService>,
    action: &'static str,
}

impl RateLimitGuard {
    pub fn new(service: Arc<RateLimitService>, action: &'static str) -> Self {
        Self { service, action }
    }
}

/// Admit or reject a request before the handler runs.
///
/// Use with `axum::middleware::from_fn_with_state(guard, rate_limit_middleware)`.
pub async fn rate_limit_middleware(
    State(guard): State<RateLimitGuard>,
    req: Request,
    next: Next,
) -> Response {
    let identity = ClientIdentity::from_headers(req.headers());
    let decision = guard.service.check(guard.action, &identity).await;
    let now_ms = Utc::now().timestamp_millis();

    if !decision.allowed {
        tracing::warn!(
            "Rate limit rejected action '{}' for user '{}' from {}",
            guard.action,
            identity.user_id,
            identity.ip
        );
        return rejection_response(&decision, now_ms);
    }

    let mut response = next.run(req).await;
    apply_rate_limit_headers(response.headers_mut(), &decision, now_ms);
    response
}

/// Structured 429 response carrying the standard rate-limit headers
pub fn rejection_response(decision: &RateLimitDecision, now_ms: i64) -> Response {
    let body = RateLimitRejectionDto::new(decision, now_ms);
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    apply_rate_limit_headers(response.headers_mut(), decision, now_ms);
    response
}

pub fn apply_rate_limit_headers(
    headers: &mut HeaderMap,
    decision: &RateLimitDecision,
    now_ms: i64,
) {
    let reset_secs = decision
        .blocked_until_ms
        .unwrap_or(decision.reset_time_ms)
        .div_euclid(1000);

    insert_header(headers, HEADER_LIMIT, decision.limit.to_string());
    insert_header(headers, HEADER_REMAINING, decision.remaining.to_string());
    insert_header(headers, HEADER_RESET, reset_secs.to_string());

    if !decision.allowed {
        insert_header(
            headers,
            HEADER_RETRY_AFTER,
            decision.retry_after_secs(now_ms).to_string(),
        );
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: String) {
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}
