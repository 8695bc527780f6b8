pub mod deploy_handler;

pub use deploy_handler::*;
