use std::collections::HashSet;

use async_trait::async_trait;
use pgvector::Vector;

use super::Database;
use crate::migration::DedupIndex;
use crate::migration::UnifiedStoreWriter;
use crate::models::UnifiedEmbeddingRecord;
use crate::Result;

/// Embedded row count per `source_table`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TableEmbeddingCount {
    pub source_table: String,
    pub embedded: i64,
}

impl Database {
    /// Distinct embedded ids for every source table in the unified store
    pub async fn embedded_counts(&self) -> Result<Vec<TableEmbeddingCount>> {
        let rows = sqlx::query_as::<_, TableEmbeddingCount>(
            r"
            SELECT source_table, COUNT(DISTINCT source_id) AS embedded
            FROM unified_embeddings
            GROUP BY source_table
            ORDER BY source_table
            ",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl UnifiedStoreWriter for Database {
    async fn upsert(&self, record: &UnifiedEmbeddingRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO unified_embeddings
                (source_table, source_type, source_id, content, embedding,
                 metadata, model_used, tokens_used, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_table, source_id)
            DO UPDATE SET
                content = EXCLUDED.content,
                embedding = EXCLUDED.embedding,
                metadata = EXCLUDED.metadata,
                model_used = EXCLUDED.model_used,
                tokens_used = EXCLUDED.tokens_used,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(&record.source_table)
        .bind(&record.source_type)
        .bind(&record.source_id)
        .bind(&record.content)
        .bind(Vector::from(record.embedding.clone()))
        .bind(&record.metadata)
        .bind(&record.model_used)
        .bind(i32::try_from(record.tokens_used).unwrap_or(i32::MAX))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DedupIndex for Database {
    async fn already_embedded(
        &self,
        source_table: &str,
        ids: &[String],
    ) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let found = sqlx::query_scalar::<_, String>(
            "SELECT source_id FROM unified_embeddings WHERE source_table = $1 AND source_id = ANY($2)",
        )
        .bind(source_table)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(found.into_iter().collect())
    }

    async fn embedded_count(&self, source_table: &str) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT source_id) FROM unified_embeddings WHERE source_table = $1",
        )
        .bind(source_table)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }
}
