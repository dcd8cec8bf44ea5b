//! Authentication service routes

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    AppState,
    error::AuthError,
    models::{NewUser, Role, User},
    otp,
    validation::{validate_department, validate_email, validate_name, validate_password},
};

/// Public view of a user returned by the auth endpoints
#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            department: user.department.clone(),
        }
    }
}

/// Request for account signup
#[derive(Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub department: Option<String>,
}

/// Request for user login
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request for a fresh verification code
#[derive(Deserialize)]
pub struct RequestOtpRequest {
    pub email: String,
}

/// Request to verify a code
#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

/// Response carrying a bearer token after successful authentication
#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: UserResponse,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/request-otp", post(request_otp))
        .route("/auth/verify-otp", post(verify_otp))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = common::database::health_check(&state.db_pool).await.is_ok();

    Json(serde_json::json!({
        "status": if database { "ok" } else { "degraded" },
        "service": "auth-service",
        "database": database,
    }))
}

/// Account signup. The account stays unverified until the emailed code is
/// confirmed.
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<impl IntoResponse, AuthError> {
    info!("Signup attempt for {}", payload.email);

    let role = payload.role.parse::<Role>().map_err(AuthError::Validation)?;
    validate_name(&payload.name).map_err(AuthError::Validation)?;
    validate_email(&payload.email).map_err(AuthError::Validation)?;
    validate_password(&payload.password).map_err(AuthError::Validation)?;
    validate_department(role, payload.department.as_deref()).map_err(AuthError::Validation)?;

    let existing = state
        .user_repository
        .find_by_email(&payload.email)
        .await
        .map_err(|e| {
            error!("Failed to look up user: {}", e);
            AuthError::Dependency
        })?;

    if existing.is_some() {
        return Err(AuthError::EmailTaken);
    }

    let new_user = NewUser {
        name: payload.name.trim().to_string(),
        email: payload.email,
        password: payload.password,
        role,
        department: payload
            .department
            .filter(|_| role == Role::GovEmployee)
            .map(|d| d.trim().to_string()),
    };

    let user = state.user_repository.create(&new_user).await.map_err(|e| {
        error!("Failed to create user: {}", e);
        AuthError::Dependency
    })?;

    issue_otp(&state, &user).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "User created successfully. Please verify your email with OTP.",
            "email": user.email,
        })),
    ))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    info!("Login attempt for {}", payload.email);

    let allowed = state
        .rate_limiter
        .is_allowed(&format!("login:{}", payload.email))
        .await
        .map_err(|e| {
            error!("Rate limiter failure: {}", e);
            AuthError::Internal
        })?;
    if !allowed {
        return Err(AuthError::RateLimited);
    }

    let user = state
        .user_repository
        .find_by_email(&payload.email)
        .await
        .map_err(|e| {
            error!("Failed to look up user: {}", e);
            AuthError::Dependency
        })?
        .ok_or(AuthError::UserNotFound)?;

    let password_ok = state
        .user_repository
        .verify_password(&user, &payload.password)
        .await
        .map_err(|e| {
            error!("Failed to verify password: {}", e);
            AuthError::Internal
        })?;
    if !password_ok {
        return Err(AuthError::InvalidCredentials);
    }

    if !user.is_verified {
        return Err(AuthError::NotVerified(user.email));
    }

    token_response(&state, &user).map(Json)
}

/// Issue a fresh verification code to an existing account
pub async fn request_otp(
    State(state): State<AppState>,
    Json(payload): Json<RequestOtpRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let allowed = state
        .rate_limiter
        .is_allowed(&format!("otp:{}", payload.email))
        .await
        .map_err(|e| {
            error!("Rate limiter failure: {}", e);
            AuthError::Internal
        })?;
    if !allowed {
        return Err(AuthError::RateLimited);
    }

    let user = state
        .user_repository
        .find_by_email(&payload.email)
        .await
        .map_err(|e| {
            error!("Failed to look up user: {}", e);
            AuthError::Dependency
        })?
        .ok_or(AuthError::UserNotFound)?;

    issue_otp(&state, &user).await?;

    Ok(Json(serde_json::json!({
        "message": "OTP sent successfully"
    })))
}

/// Verify a code. On success the account is marked verified, the code is
/// consumed, and the user is logged in.
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let user = state
        .user_repository
        .find_by_email(&payload.email)
        .await
        .map_err(|e| {
            error!("Failed to look up user: {}", e);
            AuthError::Dependency
        })?
        .ok_or(AuthError::UserNotFound)?;

    // A missing outstanding code and a mismatched code are indistinguishable
    // to the caller
    let stored = user.otp_code.as_deref().ok_or(AuthError::InvalidOtp)?;
    if stored != payload.otp {
        return Err(AuthError::InvalidOtp);
    }

    let expires_at = user.otp_expires_at.ok_or(AuthError::InvalidOtp)?;
    if otp::is_expired(expires_at, Utc::now()) {
        return Err(AuthError::OtpExpired);
    }

    let consumed = state
        .user_repository
        .consume_otp(user.id, &payload.otp)
        .await
        .map_err(|e| {
            error!("Failed to consume OTP: {}", e);
            AuthError::Dependency
        })?;
    if !consumed {
        return Err(AuthError::InvalidOtp);
    }

    info!("User {} verified", user.email);

    token_response(&state, &user).map(Json)
}

/// Issue a fresh verification code and hand it to the notifier port.
/// Delivery is fire-and-forget: failures are logged, never surfaced.
async fn issue_otp(state: &AppState, user: &User) -> Result<(), AuthError> {
    let code = otp::generate_code();
    let expires_at = otp::expiry_from(Utc::now());

    state
        .user_repository
        .store_otp(user.id, &code, expires_at)
        .await
        .map_err(|e| {
            error!("Failed to store OTP: {}", e);
            AuthError::Dependency
        })?;

    let body = format!(
        "Your verification code is {}. It expires in {} minutes.",
        code,
        otp::OTP_TTL_MINUTES
    );
    if let Err(e) = state
        .notifier
        .send(&user.email, "Your civicgrid verification code", &body)
        .await
    {
        warn!("Failed to deliver OTP mail to {}: {}", user.email, e);
    }

    Ok(())
}

fn token_response(state: &AppState, user: &User) -> Result<TokenResponse, AuthError> {
    let access_token = state.jwt_service.generate_access_token(user).map_err(|e| {
        error!("Failed to generate access token: {}", e);
        AuthError::Internal
    })?;

    Ok(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_service.access_token_expiry(),
        user: UserResponse::from(user),
    })
}
