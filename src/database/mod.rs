use std::sync::Arc;

use dashmap::DashMap;
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::Result;

mod history;
mod progress;
mod schema;
mod source;
mod unified;

pub use progress::PgProgressStore;
pub use source::KeyColumn;
pub use unified::TableEmbeddingCount;

/// Database connection pool wrapper
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
    /// Ordering key discovered per source table
    keys: Arc<DashMap<String, KeyColumn>>,
}

impl Database {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            keys: Arc::new(DashMap::new()),
        }
    }

    /// Connect to the target database holding the unified store
    pub async fn from_config(config: &crate::config::AppConfig) -> Result<Self> {
        Self::connect(&config.database).await
    }

    /// Connect to the database the source tables live in
    pub async fn source_from_config(config: &crate::config::AppConfig) -> Result<Self> {
        Self::connect(config.source_database()).await
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool_options = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.connection_timeout));

        let pool = pool_options.connect(&config.url).await?;

        tracing::info!(
            "Database pool configured: max_connections={}, min_connections={}",
            config.max_connections,
            config.min_connections
        );

        Ok(Self::new(pool))
    }

    /// Get a reference to the database pool for raw queries
    #[must_use]
    pub const fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}
