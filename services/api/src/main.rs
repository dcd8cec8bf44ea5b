use anyhow::Result;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use api::{
    middleware::JwtVerifier, routes, service::IssueService, state::AppState, store::PgIssueStore,
};
use common::database::{DatabaseConfig, health_check, init_pool};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting issue service");

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    // Verifier for access tokens issued by the auth service
    let jwt_verifier = JwtVerifier::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let issues = IssueService::new(Arc::new(PgIssueStore::new(pool.clone())));

    let app_state = AppState {
        db_pool: pool,
        issues,
        jwt_verifier: Arc::new(jwt_verifier),
    };

    info!("Issue service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3001").await?;
    info!("Issue service listening on 0.0.0.0:3001");

    axum::serve(listener, app).await?;

    Ok(())
}
