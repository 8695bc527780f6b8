pub mod rate_limit_dto;

pub use rate_limit_dto::{RateLimitCheckDto, RateLimitRejectionDto, RateLimitVerdictDto};
