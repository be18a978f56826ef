use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

use super::Database;
use crate::migration::HistoryLog;
use crate::models::MigrationHistoryEntry;
use crate::models::MigrationStatus;
use crate::Result;

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    run_id: Uuid,
    status: String,
    tables: Vec<String>,
    provider: String,
    model: String,
    batch_size: i32,
    total_records: i64,
    processed_records: i64,
    failed_records: i64,
    tokens_used: i64,
    estimated_cost: f64,
    fallback_reason: Option<String>,
    error_message: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    duration_seconds: i64,
}

impl TryFrom<HistoryRow> for MigrationHistoryEntry {
    type Error = crate::VecMigrateError;

    fn try_from(row: HistoryRow) -> Result<Self> {
        Ok(Self {
            run_id: row.run_id,
            status: row.status.parse()?,
            tables: row.tables,
            provider: row.provider,
            model: row.model,
            batch_size: usize::try_from(row.batch_size).unwrap_or(0),
            total_records: u64::try_from(row.total_records).unwrap_or(0),
            processed_records: u64::try_from(row.processed_records).unwrap_or(0),
            failed_records: u64::try_from(row.failed_records).unwrap_or(0),
            tokens_used: u64::try_from(row.tokens_used).unwrap_or(0),
            estimated_cost: row.estimated_cost,
            fallback_reason: row.fallback_reason,
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_seconds: u64::try_from(row.duration_seconds).unwrap_or(0),
        })
    }
}

fn as_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl HistoryLog for Database {
    async fn record(&self, entry: &MigrationHistoryEntry) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO migration_history
                (run_id, status, tables, provider, model, batch_size,
                 total_records, processed_records, failed_records, tokens_used,
                 estimated_cost, fallback_reason, error_message,
                 started_at, completed_at, duration_seconds, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, NOW())
            ON CONFLICT (run_id)
            DO UPDATE SET
                status = EXCLUDED.status,
                tables = EXCLUDED.tables,
                provider = EXCLUDED.provider,
                model = EXCLUDED.model,
                batch_size = EXCLUDED.batch_size,
                total_records = EXCLUDED.total_records,
                processed_records = EXCLUDED.processed_records,
                failed_records = EXCLUDED.failed_records,
                tokens_used = EXCLUDED.tokens_used,
                estimated_cost = EXCLUDED.estimated_cost,
                fallback_reason = EXCLUDED.fallback_reason,
                error_message = EXCLUDED.error_message,
                completed_at = EXCLUDED.completed_at,
                duration_seconds = GREATEST(0, EXTRACT(EPOCH FROM (
                    COALESCE(EXCLUDED.completed_at, NOW()) - migration_history.started_at
                )))::BIGINT,
                updated_at = NOW()
            ",
        )
        .bind(entry.run_id)
        .bind(entry.status.as_str())
        .bind(&entry.tables)
        .bind(&entry.provider)
        .bind(&entry.model)
        .bind(i32::try_from(entry.batch_size).unwrap_or(i32::MAX))
        .bind(as_bigint(entry.total_records))
        .bind(as_bigint(entry.processed_records))
        .bind(as_bigint(entry.failed_records))
        .bind(as_bigint(entry.tokens_used))
        .bind(entry.estimated_cost)
        .bind(&entry.fallback_reason)
        .bind(&entry.error_message)
        .bind(entry.started_at)
        .bind(entry.completed_at)
        .bind(as_bigint(entry.duration_seconds))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(
        &self,
        status: Option<MigrationStatus>,
        limit: usize,
    ) -> Result<Vec<MigrationHistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r"
            SELECT run_id, status, tables, provider, model, batch_size,
                   total_records, processed_records, failed_records, tokens_used,
                   estimated_cost, fallback_reason, error_message,
                   started_at, completed_at, duration_seconds
            FROM migration_history
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY started_at DESC
            LIMIT $2
            ",
        )
        .bind(status.map(MigrationStatus::as_str))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MigrationHistoryEntry::try_from).collect()
    }
}
