use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThrottlerError {
    /// The caller exhausted the quota of the action it invoked.
    #[error("{message}")]
    TooManyRequests {
        message: String,
        limit: u32,
        window: Duration,
    },

    #[error("Invalid quota policy: {0}")]
    InvalidPolicy(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid policy file: {0}")]
    PolicyFile(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ThrottlerResult<T> = Result<T, ThrottlerError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_error(err: &ThrottlerError) -> Self {
        match err {
            ThrottlerError::TooManyRequests { message, .. } => {
                Self::new("too_many_requests", message, 429)
            }
            ThrottlerError::Validation(errors) => {
                Self::new("validation_error", &errors.to_string(), 422)
            }
            ThrottlerError::InvalidPolicy(msg) => Self::new("invalid_policy", msg, 500),
            ThrottlerError::PolicyFile(err) => {
                Self::new("configuration_error", &err.to_string(), 500)
            }
            ThrottlerError::Io(err) => Self::new("internal_error", &err.to_string(), 500),
        }
    }
}

/// Seconds a throttled client should wait, rounded up and never zero.
pub(crate) fn retry_after_secs(window: Duration) -> u64 {
    let secs = window.as_secs() + u64::from(window.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for ThrottlerError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_error(&self);
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(body)).into_response();

        if let ThrottlerError::TooManyRequests { limit, window, .. } = self {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(window)));
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_secs(60)), 60);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_millis(10)), 1);
    }

    #[test]
    fn test_too_many_requests_response() {
        let err = ThrottlerError::TooManyRequests {
            message: "slow down".to_string(),
            limit: 5,
            window: Duration::from_secs(60),
        };

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
        assert_eq!(response.headers()["x-ratelimit-limit"], "5");
    }

    #[test]
    fn test_error_response_codes() {
        let body = ErrorResponse::from_error(&ThrottlerError::InvalidPolicy("count".into()));
        assert_eq!(body.code, 500);
        assert_eq!(body.error, "invalid_policy");
    }
}
