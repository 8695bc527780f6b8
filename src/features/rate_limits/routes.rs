use std::sync::Arc;

use axum::{routing::post, Router};

use super::handlers::check_rate_limit;
use super::services::RateLimitService;

/// Create routes for explicit rate-limit checks
pub fn routes(service: Arc<RateLimitService>) -> Router {
    Router::new()
        .route("/api/rate-limits/check", post(check_rate_limit))
        .with_state(service)
}
