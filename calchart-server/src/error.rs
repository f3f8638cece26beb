//! HTTP error type for calchart-server
//!
//! Every handler error renders as `{"error": {"code", "message"}}` with the
//! matching status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Authenticated but not allowed (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Conflict (409) - e.g., show name already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// POST without an action field (405)
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Upload larger than the configured limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// calchart-common error
    #[error("{0}")]
    Common(#[from] calchart_common::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) | ApiError::Io(_) | ApiError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Common(err) => match err {
                calchart_common::Error::NotFound(_) => StatusCode::NOT_FOUND,
                calchart_common::Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
                calchart_common::Error::Conflict(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::Internal(_) | ApiError::Other(_) => "INTERNAL_ERROR",
            ApiError::Io(_) => "IO_ERROR",
            ApiError::Common(err) => match err {
                calchart_common::Error::NotFound(_) => "NOT_FOUND",
                calchart_common::Error::InvalidInput(_) => "BAD_REQUEST",
                calchart_common::Error::Conflict(_) => "CONFLICT",
                calchart_common::Error::Database(_) => "DATABASE_ERROR",
                _ => "COMMON_ERROR",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
