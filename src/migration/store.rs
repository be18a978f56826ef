//! Storage seams used by the migration pipeline
//!
//! Postgres implementations live in `crate::database`, the Redis progress store
//! in `super::redis_progress`, in-memory fakes in the test suite.

use std::collections::HashSet;

use async_trait::async_trait;

use super::progress_codec;
use super::tables::TableSpec;
use crate::errors::Result;
use crate::models::MigrationHistoryEntry;
use crate::models::MigrationRun;
use crate::models::MigrationStatus;
use crate::models::SourcePage;
use crate::models::UnifiedEmbeddingRecord;

/// Read-only access to the source tables
#[async_trait]
pub trait SourceReader: Send + Sync {
    async fn count_rows(&self, table: &TableSpec) -> Result<u64>;

    /// Up to `limit` rows starting at `offset`, ordered by key ascending
    ///
    /// `SourcePage::fetched` counts every row the page covered, so a short
    /// page means the table is exhausted even when rows were dropped.
    async fn fetch_batch(&self, table: &TableSpec, offset: u64, limit: usize)
        -> Result<SourcePage>;
}

/// Which `(source_table, source_id)` pairs already exist in the unified store
#[async_trait]
pub trait DedupIndex: Send + Sync {
    /// Subset of `ids` already embedded for `source_table`, answered by one query
    async fn already_embedded(&self, source_table: &str, ids: &[String])
        -> Result<HashSet<String>>;

    /// Distinct source ids embedded for `source_table`
    async fn embedded_count(&self, source_table: &str) -> Result<u64>;
}

/// Idempotent writer keyed by `(source_table, source_id)`
#[async_trait]
pub trait UnifiedStoreWriter: Send + Sync {
    async fn upsert(&self, record: &UnifiedEmbeddingRecord) -> Result<()>;
}

/// Per-run log kept alongside the progress record
#[async_trait]
pub trait HistoryLog: Send + Sync {
    /// Insert or refresh the row for `entry.run_id`; the first `started_at` is kept
    async fn record(&self, entry: &MigrationHistoryEntry) -> Result<()>;

    /// Most recent runs first, optionally only those in `status`
    async fn list(
        &self,
        status: Option<MigrationStatus>,
        limit: usize,
    ) -> Result<Vec<MigrationHistoryEntry>>;
}

/// Durable home of the single persisted `MigrationRun`
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn write_document(&self, document: serde_json::Value) -> Result<()>;

    async fn read_document(&self) -> Result<Option<serde_json::Value>>;

    async fn clear(&self) -> Result<()>;

    async fn save(&self, run: &MigrationRun) -> Result<()> {
        self.write_document(progress_codec::encode(run)?).await
    }

    /// Load the persisted run; a run left `Processing` by a crash comes back `Paused`
    async fn load(&self) -> Result<Option<MigrationRun>> {
        match self.read_document().await? {
            Some(document) => Ok(Some(
                progress_codec::decode(document)?.recover_after_restart(),
            )),
            None => Ok(None),
        }
    }
}
