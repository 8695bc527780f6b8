pub mod memory_rate_limiter;
pub mod rate_limit_service;
pub mod rate_limit_store;

pub use memory_rate_limiter::MemoryRateLimiter;
pub use rate_limit_service::RateLimitService;
pub use rate_limit_store::{PgRateLimitStore, RateLimitStore, RateLimitStoreError};
