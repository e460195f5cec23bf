//! HTTP error mapping.
//!
//! Every failure leaves the daemon as `{ success: false, message, errors? }`.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use redress_common::{AuthError, FieldError, PolicyError, StoreError, ValidationError};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{}", .0.summary())]
    Validation(ValidationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(#[from] AuthError),

    #[error("{0}")]
    Forbidden(#[from] PolicyError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Route not found")]
    RouteNotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("Too many requests from this IP, please try again later.")]
    TooManyRequests,

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Server error")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(AuthError::Hash(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized(AuthError::WrongPassword) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) | ApiError::RouteNotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            StoreError::DuplicateEmail => {
                ApiError::BadRequest("User already exists with this email".to_string())
            }
            StoreError::Conflict(_) => ApiError::Conflict(
                "Complaint was modified by another request, reload and try again".to_string(),
            ),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // bodies without Content-Length are cut off while buffering
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge;
        }
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(detail) => error!("Request failed: {}", detail),
            ApiError::Unauthorized(AuthError::Hash(detail)) => {
                error!("Credential failure: {}", detail)
            }
            ApiError::Unauthorized(e) => warn!("Rejected credentials: {}", e),
            ApiError::Forbidden(e) => warn!("Policy denied: {}", e),
            ApiError::Conflict(e) => warn!("Update conflict: {}", e),
            _ => {}
        }

        let message = match &self {
            ApiError::Unauthorized(AuthError::Hash(_)) => "Server error".to_string(),
            other => other.to_string(),
        };
        let errors = match self {
            ApiError::Validation(v) => Some(v.errors),
            _ => None,
        };

        let body = ErrorBody {
            success: false,
            message,
            errors,
        };
        (status, Json(body)).into_response()
    }
}
