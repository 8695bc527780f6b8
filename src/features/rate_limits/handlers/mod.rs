pub mod rate_limit_handler;

pub use rate_limit_handler::*;
