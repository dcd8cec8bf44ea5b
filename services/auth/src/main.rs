use anyhow::Result;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

mod error;
mod jwt;
mod models;
mod notifier;
mod otp;
mod rate_limiter;
mod repositories;
mod routes;
mod validation;

use sqlx::PgPool;

use crate::{
    jwt::{JwtConfig, JwtService},
    notifier::{HttpMailer, LogMailer, MailerConfig, Notifier},
    rate_limiter::{RateLimiter, RateLimiterConfig},
    repositories::UserRepository,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub jwt_service: JwtService,
    pub user_repository: UserRepository,
    pub rate_limiter: RateLimiter,
    pub notifier: Arc<dyn Notifier>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting authentication service");

    // Initialize database connection pool
    let db_config = common::database::DatabaseConfig::from_env()?;
    let pool = common::database::init_pool(&db_config).await?;

    // Check database connectivity
    if common::database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    // Initialize JWT service
    let jwt_config = JwtConfig::from_env()?;
    let jwt_service = JwtService::new(jwt_config)?;

    // Outbound mail: HTTP gateway when configured, log-only otherwise
    let notifier: Arc<dyn Notifier> = match MailerConfig::from_env() {
        Some(config) => Arc::new(HttpMailer::new(config)),
        None => Arc::new(LogMailer),
    };

    let user_repository = UserRepository::new(pool.clone());
    let rate_limiter = RateLimiter::new(RateLimiterConfig::default());

    let app_state = AppState {
        db_pool: pool,
        jwt_service,
        user_repository,
        rate_limiter,
        notifier,
    };

    info!("Authentication service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    info!("Authentication service listening on 0.0.0.0:3000");

    axum::serve(listener, app).await?;

    Ok(())
}
