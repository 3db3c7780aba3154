//! API error types and JSON error response formatting.
//!
//! ApiError maps the engine, storage and backend errors onto HTTP status
//! codes with a consistent JSON body. Internal failures are logged with
//! their detail and answered with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use hatch_core::error::HatchError;
use hatch_llm::LlmError;
use hatch_nurture::NurtureError;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "forbidden").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 401 Unauthorized - missing or unknown credential.
    Unauthorized(String),
    /// 403 Forbidden - not premium, over the plan limit, or not the owner.
    Forbidden(String),
    /// 404 Not Found - resource does not exist.
    NotFound(String),
    /// 409 Conflict - a turn is already running on this conversation.
    Conflict(String),
    /// 500 Internal Server Error. The detail is logged, never returned.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, message) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg),
            ApiError::Unauthorized(msg) => ("unauthorized", msg),
            ApiError::Forbidden(msg) => ("forbidden", msg),
            ApiError::NotFound(msg) => ("not_found", msg),
            ApiError::Conflict(msg) => ("conflict", msg),
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "Request failed");
                ("internal_error", INTERNAL_MESSAGE.to_string())
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<HatchError> for ApiError {
    fn from(err: HatchError) -> Self {
        match err {
            HatchError::InvalidInput(msg) => ApiError::BadRequest(msg),
            HatchError::NotFound(msg) => ApiError::NotFound(msg),
            HatchError::Forbidden(msg) => ApiError::Forbidden(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<NurtureError> for ApiError {
    fn from(err: NurtureError) -> Self {
        match err {
            NurtureError::Unauthorized => ApiError::Unauthorized(err.to_string()),
            NurtureError::Forbidden(msg) => ApiError::Forbidden(msg),
            NurtureError::InvalidInput(msg) => ApiError::BadRequest(msg),
            NurtureError::NotFound(msg) => ApiError::NotFound(msg),
            NurtureError::Upstream(e) => e.into(),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        ApiError::Internal(format!("upstream: {}", err))
    }
}
