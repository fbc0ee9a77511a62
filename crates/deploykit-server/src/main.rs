//! DeployKit Server
//!
//! REST API for uploading static site bundles and switching live deployments

use anyhow::{Context, Result};
use deploykit_server::{config::Config, create_router, AppState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "deploykit_server=debug,deploykit_store=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.ensure_directories()?;

    info!("Starting DeployKit Server");
    info!("Configuration: {:?}", config);

    // Create application state
    let state = AppState::new(&config);

    // Create router
    let app = create_router(state);

    // Bind and serve
    let addr = config.api_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("DeployKit Server running on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
