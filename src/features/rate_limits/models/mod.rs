pub mod rate_limit_decision;
pub mod rate_limit_policy;

pub use rate_limit_decision::{DecisionSource, RateLimitDecision};
pub use rate_limit_policy::{ActionClass, RateLimitPolicy};
