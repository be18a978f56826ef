use super::Database;
use crate::Result;
use crate::VecMigrateError;

impl Database {
    /// Check if the unified store, progress and history tables exist
    pub async fn is_schema_initialized(&self) -> Result<bool> {
        for table_name in ["unified_embeddings", "migration_progress", "migration_history"] {
            let exists = sqlx::query_scalar::<_, bool>(
                r"
                SELECT EXISTS (
                    SELECT FROM information_schema.tables
                    WHERE table_schema = current_schema()
                    AND table_name = $1
                )
                ",
            )
            .bind(table_name)
            .fetch_one(&self.pool)
            .await?;

            if !exists {
                tracing::debug!("Missing required table: {}", table_name);
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Verify the schema exists and its vector column matches `dimension`
    pub async fn verify_schema_or_error(&self, dimension: usize) -> Result<()> {
        if !self.is_schema_initialized().await? {
            return Err(VecMigrateError::ConfigError(
                "Database schema not initialized. Run `vecmigrate init` first.".to_string(),
            ));
        }
        match self.vector_dimension().await? {
            Some(existing) if existing != dimension => Err(VecMigrateError::ConfigError(format!(
                "unified_embeddings.embedding has {existing} dimensions but the provider produces {dimension}"
            ))),
            _ => Ok(()),
        }
    }

    /// Declared dimension of `unified_embeddings.embedding`
    pub async fn vector_dimension(&self) -> Result<Option<usize>> {
        let typmod = sqlx::query_scalar::<_, i32>(
            r"
            SELECT a.atttypmod
            FROM pg_attribute a
            WHERE a.attrelid = to_regclass('unified_embeddings')
            AND a.attname = 'embedding'
            AND NOT a.attisdropped
            ",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(typmod.and_then(|t| usize::try_from(t).ok()).filter(|d| *d > 0))
    }

    /// Create the unified store, progress and history tables
    pub async fn init_schema(&self, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(VecMigrateError::ConfigError(
                "embedding dimension must be at least 1".to_string(),
            ));
        }

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;

        sqlx::query(&format!(
            r"
            CREATE TABLE IF NOT EXISTS unified_embeddings (
                id BIGSERIAL PRIMARY KEY,
                source_table TEXT NOT NULL,
                source_type TEXT NOT NULL DEFAULT 'database',
                source_id TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding vector({dimension}),
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                model_used TEXT,
                tokens_used INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT unified_embeddings_source_key UNIQUE (source_table, source_id)
            )
            "
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_unified_embeddings_source_table ON unified_embeddings (source_table)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS migration_progress (
                id TEXT PRIMARY KEY,
                state JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS migration_history (
                run_id UUID PRIMARY KEY,
                status TEXT NOT NULL,
                tables TEXT[] NOT NULL DEFAULT '{}',
                provider TEXT NOT NULL DEFAULT '',
                model TEXT NOT NULL DEFAULT '',
                batch_size INTEGER NOT NULL DEFAULT 0,
                total_records BIGINT NOT NULL DEFAULT 0,
                processed_records BIGINT NOT NULL DEFAULT 0,
                failed_records BIGINT NOT NULL DEFAULT 0,
                tokens_used BIGINT NOT NULL DEFAULT 0,
                estimated_cost DOUBLE PRECISION NOT NULL DEFAULT 0,
                fallback_reason TEXT,
                error_message TEXT,
                started_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ,
                duration_seconds BIGINT NOT NULL DEFAULT 0,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_migration_history_status_started ON migration_history (status, started_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Schema initialized with vector({})", dimension);
        Ok(())
    }
}
