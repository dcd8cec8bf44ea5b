//! Issue service routes
//!
//! Reads are public; every mutation and the analytics endpoint go through
//! the authentication middleware.

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_middleware,
    models::{AuthUser, CommentRequest, IssueFilter, IssueQuery, IssueStatus, ReportIssueRequest, TransitionRequest},
    state::AppState,
};

/// Create the router for the issue service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/issues", post(report_issue))
        .route("/issues/:id", put(update_status))
        .route("/issues/:id/upvote", post(upvote_issue))
        .route("/issues/:id/comments", post(add_comment))
        .route("/analytics", get(analytics))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/issues", get(list_issues))
        .route("/issues/:id", get(get_issue))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = common::database::health_check(&state.db_pool).await.is_ok();

    Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "service": "issue-service",
        "database": database,
    }))
}

/// Report a new issue; rejected when a similar unresolved issue is nearby
pub async fn report_issue(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ReportIssueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let issue = state.issues.report(&user, payload).await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

/// List issues, optionally filtered by status
pub async fn list_issues(
    State(state): State<AppState>,
    Query(query): Query<IssueQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<IssueStatus>)
        .transpose()
        .map_err(ApiError::Validation)?;

    let issues = state.issues.list(IssueFilter { status }).await?;
    Ok(Json(issues))
}

/// Fetch a single issue with its comment thread
pub async fn get_issue(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let issue = state.issues.get(id).await?;
    Ok(Json(issue))
}

/// Move an issue through the status lifecycle (government staff only)
pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let issue = state.issues.transition(&user, id, payload).await?;
    Ok(Json(issue))
}

/// Add one upvote to an issue
pub async fn upvote_issue(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let upvotes = state.issues.upvote(id).await?;
    Ok(Json(json!({ "id": id, "upvotes": upvotes })))
}

/// Append a comment to an issue's thread
pub async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let issue = state.issues.add_comment(id, &payload.text).await?;
    Ok(Json(issue))
}

/// Count of issues per status for dashboards (government staff only)
pub async fn analytics(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let counts = state.issues.count_by_status(&user).await?;
    Ok(Json(counts))
}
