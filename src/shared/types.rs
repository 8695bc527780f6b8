use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body returned for every request that fails before reaching a feature handler
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: String, errors: Option<Vec<String>>) -> Self {
        Self {
            ok: false,
            error,
            errors,
        }
    }
}
