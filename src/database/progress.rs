use async_trait::async_trait;

use super::Database;
use crate::migration::ProgressStore;
use crate::Result;

/// Row id of the single persisted run
const PROGRESS_ROW: &str = "current";

/// Progress record kept as one JSONB row of `migration_progress`
#[derive(Debug, Clone)]
pub struct PgProgressStore {
    db: Database,
}

impl PgProgressStore {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProgressStore for PgProgressStore {
    async fn write_document(&self, document: serde_json::Value) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO migration_progress (id, state, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (id)
            DO UPDATE SET
                state = EXCLUDED.state,
                updated_at = NOW()
            ",
        )
        .bind(PROGRESS_ROW)
        .bind(document)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn read_document(&self) -> Result<Option<serde_json::Value>> {
        let state = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT state FROM migration_progress WHERE id = $1",
        )
        .bind(PROGRESS_ROW)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(state)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM migration_progress WHERE id = $1")
            .bind(PROGRESS_ROW)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }
}
