pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod workers;

pub use middleware::{rate_limit_middleware, RateLimitGuard};
pub use services::{PgRateLimitStore, RateLimitService};
pub use workers::RateLimitSweeper;
