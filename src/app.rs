//! Wiring of configuration, databases and the migration manager

use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::config::ProgressBackend;
use crate::database::Database;
use crate::database::PgProgressStore;
use crate::embeddings::build_adapter;
use crate::embeddings::registry::configured_dimension;
use crate::migration::ManagerSettings;
use crate::migration::MigrationDeps;
use crate::migration::MigrationManager;
use crate::migration::ProgressStore;
use crate::migration::RedisProgressStore;
use crate::migration::TableRegistry;
use crate::Result;

/// Main application handle
pub struct VecMigrate {
    config: AppConfig,
    database: Database,
    source: Database,
}

impl VecMigrate {
    /// Connect to the target database and, when configured separately, the source database
    pub async fn new(config: AppConfig) -> Result<Self> {
        let database = Database::from_config(&config).await?;
        let source = if config.source_database.is_some() {
            Database::source_from_config(&config).await?
        } else {
            database.clone()
        };
        Ok(Self {
            config,
            database,
            source,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Target database holding the unified store
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.database
    }

    #[must_use]
    pub const fn source(&self) -> &Database {
        &self.source
    }

    pub fn table_registry(&self) -> Result<TableRegistry> {
        TableRegistry::from_config(&self.config.tables)
    }

    /// Dimension of the vectors the configured provider produces
    pub fn embedding_dimension(&self) -> Result<usize> {
        configured_dimension(&self.config.embeddings)
    }

    /// Create the unified store, progress and history tables
    pub async fn init_schema(&self) -> Result<usize> {
        let dimension = self.embedding_dimension()?;
        self.database.init_schema(dimension).await?;
        Ok(dimension)
    }

    pub fn progress_store(&self) -> Result<Arc<dyn ProgressStore>> {
        Ok(match self.config.migration.progress_backend {
            ProgressBackend::Postgres => Arc::new(PgProgressStore::new(self.database.clone())),
            ProgressBackend::Redis => Arc::new(RedisProgressStore::connect(&self.config.redis)?),
        })
    }

    /// Build a manager for the configured provider
    ///
    /// Fails before touching any data when credentials are missing or the
    /// unified store's vector column does not match the provider.
    pub async fn migration_manager(&self) -> Result<MigrationManager> {
        let adapter = Arc::new(build_adapter(&self.config)?);
        self.database
            .verify_schema_or_error(adapter.dimension())
            .await?;

        info!(
            provider = adapter.provider_name(),
            model = adapter.model(),
            dimension = adapter.dimension(),
            "Migration manager ready"
        );

        let deps = MigrationDeps {
            source: Arc::new(self.source.clone()),
            dedup: Arc::new(self.database.clone()),
            writer: Arc::new(self.database.clone()),
            progress: self.progress_store()?,
            history: Arc::new(self.database.clone()),
            adapter,
        };
        let settings = ManagerSettings {
            persist_every: self.config.persist_every(),
            content_max_chars: self.config.content_max_chars(),
        };

        MigrationManager::open(deps, self.table_registry()?, settings).await
    }
}
