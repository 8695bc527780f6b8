pub mod deploy_lock;
pub mod deploy_meter;
pub mod deploy_response;
pub mod log_entry;

pub use deploy_lock::DeployLock;
pub use deploy_meter::{
    normalize_actor, normalize_billing_status, normalize_plan_tier, DailyLimits, DeployMeter,
    MeterUser, QuotaSnapshot,
};
pub use deploy_response::{DeployResponse, DeployTriggerStatus, LastSuccess};
pub use log_entry::{LogEntry, LogLevel, LogRing};
