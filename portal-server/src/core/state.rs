//! Application state

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::core::Config;
use crate::db;
use crate::progression::catalog::RoleCatalog;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection pool
    pub pool: SqlitePool,
    /// Role catalog, loaded once at startup and read-only thereafter.
    /// Changing requirements takes effect on restart.
    pub catalog: Arc<RoleCatalog>,
}

impl AppState {
    /// Create a new AppState
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(&config.database_url).await?;
        let catalog = RoleCatalog::load(&pool).await?;
        tracing::info!(roles = catalog.len(), "role catalog loaded");
        Ok(Self {
            pool,
            catalog: Arc::new(catalog),
        })
    }
}
