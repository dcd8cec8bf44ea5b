//! Custom error types for the issue service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use common::error::DatabaseError;

/// Custom error type for the issue service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Input failed validation
    #[error("{0}")]
    Validation(String),

    /// Unknown issue
    #[error("{0}")]
    NotFound(String),

    /// A similar unresolved issue already exists nearby
    #[error("{0}")]
    Conflict(String),

    /// Missing or invalid bearer token
    #[error("Unauthorized")]
    Unauthorized,

    /// Caller lacks the required role
    #[error("{0}")]
    Forbidden(String),

    /// A backing store could not be reached; never downgraded to an empty
    /// answer
    #[error("Service temporarily unavailable")]
    Dependency(#[from] DatabaseError),

    /// Internal server error
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Dependency(source) = &self {
            error!("Dependency failure: {}", source);
        }

        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Type alias for issue service results
pub type ApiResult<T> = Result<T, ApiError>;
