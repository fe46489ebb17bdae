// src/error.rs
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Structured error body returned to API clients.
#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Serialize, Debug)]
struct ErrorDetails {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

/// All failure modes of the gateway.
///
/// The generation taxonomy (`NoCredentialsAvailable` through
/// `RetriesExhausted`) carries a stable wire code via [`AppError::error_code`];
/// the remaining variants are infrastructure errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlParsing(#[from] serde_yaml::Error),

    #[error("JSON processing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[cfg(feature = "redis")]
    #[error("Redis pool error: {0}")]
    RedisPool(#[from] deadpool_redis::PoolError),

    #[cfg(feature = "redis")]
    #[error("Redis command error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid API key")]
    InvalidClientApiKey,

    #[error("No credentials available")]
    NoCredentialsAvailable,

    #[error("Upstream rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Upstream rejected the credential: {0}")]
    Unauthorized(String),

    #[error("Generation blocked: {0}")]
    Blocked(String),

    #[error("Upstream connection error: {0}")]
    ConnectionError(String),

    #[error("Generation timed out after {0}s")]
    Timeout(u64),

    #[error("No image data received")]
    IncompleteGeneration,

    #[error("Upstream error {code}: {message}")]
    Upstream { code: String, message: String },

    #[error("All retries failed")]
    RetriesExhausted,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable classification code surfaced to clients and used by the
    /// retry loop.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoCredentialsAvailable => "no_credentials_available",
            Self::RateLimited(_) => "rate_limit_exceeded",
            Self::Unauthorized(_) => "unauthorized",
            Self::Blocked(_) => "blocked",
            Self::ConnectionError(_) => "connection_error",
            Self::Timeout(_) => "timeout",
            Self::IncompleteGeneration => "incomplete_generation",
            Self::Upstream { .. } => "upstream_error",
            Self::RetriesExhausted => "all_retries_failed",
            Self::BadRequest(_) => "bad_request",
            Self::InvalidClientApiKey => "invalid_api_key",
            Self::Config(_) => "config_error",
            _ => "internal_error",
        }
    }

    /// Failure classes that a different credential may fix. The retry loop
    /// rotates on these; everything else surfaces immediately.
    pub fn is_rotation_recoverable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Unauthorized(_))
    }

    /// Maps an upstream error frame to its classification.
    pub fn from_upstream(code: &str, message: &str) -> Self {
        match code {
            "rate_limit_exceeded" => Self::RateLimited(message.to_string()),
            "unauthorized" => Self::Unauthorized(message.to_string()),
            _ => Self::Upstream {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }

    fn to_status_and_details(&self) -> (StatusCode, ErrorDetails) {
        let status = match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidClientApiKey => StatusCode::UNAUTHORIZED,
            Self::NoCredentialsAvailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Unauthorized(_)
            | Self::Blocked(_)
            | Self::ConnectionError(_)
            | Self::IncompleteGeneration
            | Self::Upstream { .. }
            | Self::RetriesExhausted => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Internal details are logged, not leaked, for server-side failures.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "internal error");
            "An unexpected internal server error occurred".to_string()
        } else {
            self.to_string()
        };

        (
            status,
            ErrorDetails {
                error_type: self.error_code().to_string(),
                message,
            },
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, details) = self.to_status_and_details();
        (status, Json(ErrorResponse { error: details })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(AppError::NoCredentialsAvailable.error_code(), "no_credentials_available");
        assert_eq!(AppError::RateLimited(String::new()).error_code(), "rate_limit_exceeded");
        assert_eq!(AppError::Blocked(String::new()).error_code(), "blocked");
        assert_eq!(AppError::Timeout(120).error_code(), "timeout");
        assert_eq!(AppError::IncompleteGeneration.error_code(), "incomplete_generation");
    }

    #[test]
    fn only_rate_limit_and_unauthorized_rotate() {
        assert!(AppError::RateLimited(String::new()).is_rotation_recoverable());
        assert!(AppError::Unauthorized(String::new()).is_rotation_recoverable());
        assert!(!AppError::Blocked(String::new()).is_rotation_recoverable());
        assert!(!AppError::ConnectionError(String::new()).is_rotation_recoverable());
        assert!(!AppError::Timeout(1).is_rotation_recoverable());
        assert!(!AppError::NoCredentialsAvailable.is_rotation_recoverable());
    }

    #[test]
    fn upstream_frames_classify() {
        assert!(matches!(
            AppError::from_upstream("rate_limit_exceeded", "slow down"),
            AppError::RateLimited(_)
        ));
        assert!(matches!(
            AppError::from_upstream("unauthorized", "bad sso"),
            AppError::Unauthorized(_)
        ));
        assert!(matches!(
            AppError::from_upstream("content_violation", "nope"),
            AppError::Upstream { .. }
        ));
    }
}
