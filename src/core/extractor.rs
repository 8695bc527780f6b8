use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Path, Request},
    http::{request::Parts, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

use crate::core::error::AppError;
use crate::shared::constants::{ANONYMOUS_USER, UNKNOWN_IP, USER_ID_HEADER};
use crate::shared::validation::{is_valid_target, MAX_TARGET_LEN};

/// Custom JSON extractor that provides consistent error responses
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppJsonRejection;

    async fn from_request(req: Request<Body>, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(value) => Ok(Self(value.0)),
            Err(rejection) => Err(AppJsonRejection(rejection)),
        }
    }
}

pub struct AppJsonRejection(JsonRejection);

impl IntoResponse for AppJsonRejection {
    fn into_response(self) -> Response {
        let message = match self.0 {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON data: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("Invalid JSON syntax: {}", err),
            JsonRejection::MissingJsonContentType(err) => {
                format!("Missing JSON content type: {}", err)
            }
            _ => "Failed to parse JSON body".to_string(),
        };

        AppError::BadRequest(message).into_response()
    }
}

/// Caller identity as seen by the rate limiter.
///
/// Both fields always have a value; absent headers fall back to
/// `anonymous` / `unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub user_id: String,
    pub ip: String,
}

impl ClientIdentity {
    /// Client address header chain, most trusted first
    const IP_HEADERS: [&'static str; 3] = ["cf-connecting-ip", "x-forwarded-for", "x-real-ip"];

    #[cfg(test)]
    pub fn anonymous() -> Self {
        Self {
            user_id: ANONYMOUS_USER.to_string(),
            ip: UNKNOWN_IP.to_string(),
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        let user_id = header_value(headers, USER_ID_HEADER)
            .unwrap_or_else(|| ANONYMOUS_USER.to_string());

        // x-forwarded-for may carry a proxy chain; the client is the first hop
        let ip = Self::IP_HEADERS
            .iter()
            .find_map(|name| {
                header_value(headers, name)
                    .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
                    .filter(|v| !v.is_empty())
            })
            .unwrap_or_else(|| UNKNOWN_IP.to_string());

        Self { user_id, ip }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIdentity::from_headers(&parts.headers))
    }
}

/// Deploy target slug taken from the `{target}` path segment
#[derive(Debug, Clone)]
pub struct DeployTarget(pub String);

impl<S> FromRequestParts<S> for DeployTarget
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(target) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid target path: {}", e)))?;

        if !is_valid_target(&target) {
            return Err(AppError::Validation(format!(
                "Target must be a lowercase slug of at most {} characters",
                MAX_TARGET_LEN
            )));
        }

        Ok(DeployTarget(target))
    }
}
