pub mod deploys;
pub mod rate_limits;
