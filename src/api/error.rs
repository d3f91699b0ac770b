//! JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

/// An error a handler returns to the client as `{"error": message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 400
    BadRequest(String),
    /// 401
    Unauthorized(String),
    /// 403
    Forbidden(String),
    /// 409
    Conflict(String),
    /// 429
    TooManyRequests(String),
    /// 500, with internal detail already logged
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to the client
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::Conflict(m)
            | Self::TooManyRequests(m)
            | Self::Internal(m) => m,
        }
    }

    pub(crate) fn unauthorized() -> Self {
        Self::Unauthorized("Unauthorized".to_string())
    }
}

/// Internal errors are logged and reported without detail.
impl From<crate::errors::Error> for ApiError {
    fn from(e: crate::errors::Error) -> Self {
        error!("Request failed: {}", e);
        match e {
            crate::errors::Error::Database(_) => Self::Internal("Database error".to_string()),
            _ => Self::Internal("Internal server error".to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}

/// Handler result
pub type ApiResult<T> = std::result::Result<T, ApiError>;
