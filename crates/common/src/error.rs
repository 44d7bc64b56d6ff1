use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Common error types used across the allocation services.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Missing conversion rate: {0}")]
    MissingRate(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP-style status code carried in allocation outcomes.
    pub fn code(&self) -> u16 {
        self.status().as_u16()
    }

    /// Whether a retry of the same remote call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Unavailable(_) | AppError::Timeout(_) | AppError::Redis(_) => true,
            AppError::Http(e) => !e.is_decode() && !e.is_builder(),
            _ => false,
        }
    }

    /// A failed ledger commit. Never retried, never rolled back by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Commit(_))
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Decode(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Http(_) | AppError::Malformed(_) | AppError::MissingRate(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Redis(_)
            | AppError::Serialization(_)
            | AppError::Commit(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Validation(msg) | AppError::NotFound(msg) | AppError::Decode(msg) => {
                msg.clone()
            }
            _ => self.to_string(),
        };

        let body = json!({ "error": message, "code": status.as_u16() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_error_class() {
        assert_eq!(AppError::Validation("x".into()).code(), 400);
        assert_eq!(AppError::NotFound("x".into()).code(), 404);
        assert_eq!(AppError::Malformed("x".into()).code(), 502);
        assert_eq!(AppError::Unavailable("x".into()).code(), 503);
        assert_eq!(AppError::Timeout("x".into()).code(), 504);
        assert_eq!(AppError::Commit("x".into()).code(), 500);
    }

    #[test]
    fn test_only_remote_failures_are_transient() {
        assert!(AppError::Unavailable("down".into()).is_transient());
        assert!(AppError::Timeout("slow".into()).is_transient());
        assert!(!AppError::Malformed("garbage".into()).is_transient());
        assert!(!AppError::NotFound("deal".into()).is_transient());
        assert!(!AppError::Commit("batch".into()).is_transient());
    }

    #[test]
    fn test_commit_is_fatal() {
        assert!(AppError::Commit("batch".into()).is_fatal());
        assert!(!AppError::Timeout("fx".into()).is_fatal());
    }
}
