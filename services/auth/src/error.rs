//! Custom error types for the authentication service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Custom error type for the authentication service
#[derive(Error, Debug)]
pub enum AuthError {
    /// Input failed validation
    #[error("{0}")]
    Validation(String),

    /// Unknown user
    #[error("User not found")]
    UserNotFound,

    /// Email already registered
    #[error("User already exists")]
    EmailTaken,

    /// Wrong email/password combination
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Account exists but has not completed email verification; carries the
    /// email so the client can resume the OTP flow
    #[error("Email not verified")]
    NotVerified(String),

    /// Missing or mismatched verification code
    #[error("Invalid OTP")]
    InvalidOtp,

    /// Verification code past its five-minute window
    #[error("OTP has expired")]
    OtpExpired,

    /// Too many attempts for this account
    #[error("Too many attempts, try again later")]
    RateLimited,

    /// A backing store could not be reached; logged at the call site
    #[error("Service temporarily unavailable")]
    Dependency,

    /// Internal server error
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::InvalidCredentials => StatusCode::BAD_REQUEST,
            AuthError::NotVerified(_) => StatusCode::FORBIDDEN,
            AuthError::InvalidOtp => StatusCode::BAD_REQUEST,
            AuthError::OtpExpired => StatusCode::BAD_REQUEST,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Dependency => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            AuthError::NotVerified(email) => json!({
                "error": self.to_string(),
                "email": email,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
