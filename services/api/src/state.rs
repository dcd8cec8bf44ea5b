//! Application state shared across handlers

use sqlx::PgPool;
use std::sync::Arc;

use crate::{middleware::JwtVerifier, service::IssueService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub issues: IssueService,
    pub jwt_verifier: Arc<JwtVerifier>,
}
