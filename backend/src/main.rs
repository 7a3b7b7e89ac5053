//! Stockroom - Backend Server
//!
//! Receives supplier deliveries into warehouse stock.

use std::{net::SocketAddr, sync::Arc};

use stockroom_backend::{create_app, store::PostgresStore, AppState, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "stockroom_server=debug,stockroom_backend=debug,tower_http=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting Stockroom Server");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let store = PostgresStore::connect(&config.database, config.receipts.lock_timeout()).await?;
    tracing::info!(
        isolation_level = config.database.isolation_level.to_sql(),
        "Database connection established"
    );

    if config.database.run_migrations {
        tracing::info!("Running database migrations...");
        store.migrate().await?;
        tracing::info!("Migrations completed");
    }

    // Build application
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState::new(Arc::new(store), config);
    let app = create_app(state);

    // Start server
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
