pub mod deploy_dto;

pub use deploy_dto::*;
