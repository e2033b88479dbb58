//! guildhouse portal-server
//!
//! Long-running service that:
//! - Records point-earning/spending events (idempotent ledger)
//! - Evaluates and performs membership role advancement
//! - Tracks referrals and activity streaks
//! - Serves the member dashboard and admin back-office API

use portal_server::api;
use portal_server::core::{AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portal_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Starting portal-server (env: {})", config.environment);

    let state = AppState::new(&config).await?;
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("portal-server listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
