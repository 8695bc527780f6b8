pub mod deploy_controller;
pub mod deploy_registry;
pub mod deploy_state_store;
pub mod deploy_trigger;

pub use deploy_controller::{
    ControllerStatus, DeployController, DeployControllerConfig, DeployEnvironment, RunOutcome,
    RunReport, RunRequest,
};
pub use deploy_registry::DeployControllerRegistry;
pub use deploy_state_store::{load_slot, save_slot, DeployStateStore, PgDeployStateStore, StateSlot};
pub use deploy_trigger::{DeployTrigger, RemoteDeployTrigger, TriggerRequest};
