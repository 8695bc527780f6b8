use thiserror::Error;

use crate::core::error::AppError;

/// Failures that abort a single deploy run. The controller stays usable afterwards.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Missing required environment: {}", .missing.join(", "))]
    Configuration { missing: Vec<String> },

    #[error("Failed to persist deploy state: {0}")]
    Store(#[from] AppError),

    #[error("Deploy pipeline panicked: {0}")]
    Panicked(String),
}
