use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::Result;
use crate::errors::VecMigrateError;

/// Value stored in `unified_embeddings.source_type` for every migrated row
pub const SOURCE_TYPE_DATABASE: &str = "database";

/// Schema version of the canonical persisted `MigrationRun`
pub const PROGRESS_SCHEMA_VERSION: u32 = 2;

/// Lifecycle state of a migration run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    #[default]
    Idle,
    Processing,
    Paused,
    Stopped,
    Completed,
    Error,
}

impl MigrationStatus {
    /// Whether `self → next` is a legal edge of the run state machine
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle | Self::Paused, Self::Processing)
                | (
                    Self::Processing,
                    Self::Paused | Self::Completed | Self::Error | Self::Stopped
                )
                | (Self::Paused, Self::Stopped)
        )
    }

    /// Stopped, Completed and Error only leave through a new start
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Error)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MigrationStatus {
    type Err = VecMigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "processing" => Ok(Self::Processing),
            "paused" => Ok(Self::Paused),
            "stopped" => Ok(Self::Stopped),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(VecMigrateError::InvalidInput(format!(
                "unknown migration status '{other}'"
            ))),
        }
    }
}

/// Per-table cursor inside a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableProgress {
    pub table_name: String,
    pub display_name: String,
    pub total_in_table: u64,
    pub embedded_count: u64,
    /// Source-table position of the last fully processed batch boundary
    pub offset: u64,
    /// Rows skipped because they had no text
    #[serde(default)]
    pub skipped: u64,
    #[serde(default)]
    pub completed: bool,
    /// Set when the table was abandoned after a table-level failure
    #[serde(default)]
    pub failed: Option<String>,
}

impl TableProgress {
    #[must_use]
    pub fn new(table_name: &str, display_name: &str, total_in_table: u64, embedded_count: u64) -> Self {
        Self {
            table_name: table_name.to_string(),
            display_name: display_name.to_string(),
            total_in_table,
            embedded_count,
            ..Self::default()
        }
    }

    /// Move the cursor past a finished batch; the offset never decreases
    pub fn advance(&mut self, batch_size: usize) {
        self.offset += batch_size as u64;
    }

    /// Whether nothing remains to be done for this table
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.completed || self.failed.is_some()
    }
}

/// Batch-aligned cursor for a table that already has `embedded_count` rows embedded
#[must_use]
pub const fn resume_offset(embedded_count: u64, batch_size: usize) -> u64 {
    let batch = batch_size as u64;
    if batch == 0 {
        return 0;
    }
    (embedded_count / batch) * batch
}

/// Top-level mutable state of one migration invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRun {
    #[serde(default = "current_version")]
    pub version: u32,
    pub id: Uuid,
    pub status: MigrationStatus,
    pub tables: Vec<String>,
    pub current_table: Option<String>,
    /// Records embedded so far, cumulative across the run
    pub current: u64,
    /// Records requiring embedding at run start
    pub total: u64,
    pub tokens_used: u64,
    pub estimated_cost: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub fallback_mode: bool,
    #[serde(default)]
    pub fallback_reason: Option<String>,
    #[serde(default)]
    pub batch_size: usize,
    #[serde(default)]
    pub worker_count: usize,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub processed_tables: Vec<String>,
    #[serde(default)]
    pub table_progress: BTreeMap<String, TableProgress>,
    pub updated_at: DateTime<Utc>,
}

const fn current_version() -> u32 {
    PROGRESS_SCHEMA_VERSION
}

impl Default for MigrationRun {
    fn default() -> Self {
        Self {
            version: PROGRESS_SCHEMA_VERSION,
            id: Uuid::new_v4(),
            status: MigrationStatus::Idle,
            tables: Vec::new(),
            current_table: None,
            current: 0,
            total: 0,
            tokens_used: 0,
            estimated_cost: 0.0,
            start_time: None,
            error: None,
            error_count: 0,
            fallback_mode: false,
            fallback_reason: None,
            batch_size: 0,
            worker_count: 0,
            provider: String::new(),
            model: String::new(),
            processed_tables: Vec::new(),
            table_progress: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }
}

impl MigrationRun {
    /// Fresh idle run for the given tables
    #[must_use]
    pub fn new(tables: Vec<String>, batch_size: usize, worker_count: usize) -> Self {
        Self {
            tables,
            batch_size,
            worker_count,
            ..Self::default()
        }
    }

    /// Apply a status change, rejecting edges the state machine does not allow
    pub fn transition(&mut self, next: MigrationStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(VecMigrateError::InvalidState(format!(
                "cannot move migration from {} to {}",
                self.status, next
            )));
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Account one record written to the unified store
    pub fn record_embedded(&mut self, table: &str, tokens: u64, cost: f64) {
        self.current += 1;
        // Rows inserted into a source table after the run started
        if self.current > self.total {
            self.total = self.current;
        }
        self.tokens_used += tokens;
        self.estimated_cost += cost;
        if let Some(progress) = self.table_progress.get_mut(table) {
            progress.embedded_count += 1;
            if progress.embedded_count > progress.total_in_table {
                progress.total_in_table = progress.embedded_count;
            }
        }
        self.touch();
    }

    /// Account a record or table failure that does not stop the run
    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.error_count += 1;
        self.error = Some(message.into());
        self.touch();
    }

    pub fn enter_fallback(&mut self, reason: &str) {
        self.fallback_mode = true;
        self.fallback_reason = Some(reason.to_string());
        self.touch();
    }

    /// Undo a crash: a run that was processing is never resumed implicitly
    #[must_use]
    pub fn recover_after_restart(mut self) -> Self {
        if self.status == MigrationStatus::Processing {
            self.status = MigrationStatus::Paused;
            self.touch();
        }
        self
    }

    /// Whether every table has been drained or abandoned
    #[must_use]
    pub fn all_tables_settled(&self) -> bool {
        self.tables.iter().all(|t| {
            self.table_progress
                .get(t)
                .is_some_and(TableProgress::is_settled)
        })
    }

    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return if self.status == MigrationStatus::Completed {
                100.0
            } else {
                0.0
            };
        }
        (self.current as f64 / self.total as f64) * 100.0
    }

    /// Records embedded per minute since the run started
    #[must_use]
    pub fn processing_speed(&self, now: DateTime<Utc>, baseline: u64) -> f64 {
        let Some(start) = self.start_time else {
            return 0.0;
        };
        let elapsed = (now - start).num_milliseconds() as f64 / 1000.0;
        let done = self.current.saturating_sub(baseline);
        if elapsed <= 0.0 || done == 0 {
            return 0.0;
        }
        done as f64 / elapsed * 60.0
    }

    /// Estimated seconds until `current` reaches `total` at the observed rate
    #[must_use]
    pub fn estimated_seconds_remaining(&self, now: DateTime<Utc>, baseline: u64) -> Option<u64> {
        let per_minute = self.processing_speed(now, baseline);
        if per_minute <= 0.0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.current) as f64;
        Some((remaining / per_minute * 60.0).round() as u64)
    }
}

/// Snapshot of a run plus the values derived from it for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    #[serde(flatten)]
    pub run: MigrationRun,
    pub percentage: f64,
    /// Records per minute
    pub processing_speed: f64,
    pub estimated_seconds_remaining: Option<u64>,
}

impl ProgressReport {
    #[must_use]
    pub fn from_run(run: &MigrationRun, now: DateTime<Utc>, baseline: u64) -> Self {
        Self {
            percentage: run.percentage(),
            processing_speed: run.processing_speed(now, baseline),
            estimated_seconds_remaining: run.estimated_seconds_remaining(now, baseline),
            run: run.clone(),
        }
    }
}

/// One source row as fetched for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// Stringified primary key, or row number when the table has none
    pub id: String,
    pub text: Option<String>,
}

impl SourceRow {
    /// Whether the row is included by `SourceReader::count_rows`
    /// (non-null and not blank once spaces are trimmed, as `btrim` does)
    #[must_use]
    pub fn is_counted(&self) -> bool {
        self.text
            .as_deref()
            .is_some_and(|t| !t.trim_matches(' ').is_empty())
    }
}

/// One page read from a source table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePage {
    /// Rows with a usable id, in key order
    pub rows: Vec<SourceRow>,
    /// Rows the page query returned, including those dropped for a NULL id
    pub fetched: usize,
}

impl SourcePage {
    #[must_use]
    pub fn new(rows: Vec<SourceRow>) -> Self {
        let fetched = rows.len();
        Self { rows, fetched }
    }

    /// Rows of the page that could not be identified
    #[must_use]
    pub fn missing_ids(&self) -> usize {
        self.fetched.saturating_sub(self.rows.len())
    }
}

/// Durable output unit, unique on `(source_table, source_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedEmbeddingRecord {
    /// Display name of the source table
    pub source_table: String,
    pub source_type: String,
    pub source_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub model_used: String,
    pub tokens_used: u64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the migration history log, keyed by run id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationHistoryEntry {
    pub run_id: Uuid,
    pub status: MigrationStatus,
    pub tables: Vec<String>,
    pub provider: String,
    pub model: String,
    pub batch_size: usize,
    pub total_records: u64,
    pub processed_records: u64,
    pub failed_records: u64,
    pub tokens_used: u64,
    pub estimated_cost: f64,
    pub fallback_reason: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    /// Set once the run reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: u64,
}

impl MigrationHistoryEntry {
    /// History row describing `run` as of `now`
    #[must_use]
    pub fn from_run(run: &MigrationRun, now: DateTime<Utc>) -> Self {
        let started_at = run.start_time.unwrap_or(now);
        let completed_at = run.status.is_terminal().then_some(now);
        Self {
            run_id: run.id,
            status: run.status,
            tables: run.tables.clone(),
            provider: run.provider.clone(),
            model: run.model.clone(),
            batch_size: run.batch_size,
            total_records: run.total,
            processed_records: run.current,
            failed_records: run.error_count,
            tokens_used: run.tokens_used,
            estimated_cost: run.estimated_cost,
            fallback_reason: run.fallback_reason.clone(),
            error_message: run.error.clone(),
            started_at,
            completed_at,
            duration_seconds: Self::seconds_between(started_at, completed_at.unwrap_or(now)),
        }
    }

    /// Whole seconds from `start` to `end`, zero when the clock went backwards
    #[must_use]
    pub fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
        u64::try_from((end - start).num_seconds()).unwrap_or(0)
    }

    /// Share of `total_records` already processed
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        self.processed_records as f64 / self.total_records as f64 * 100.0
    }
}
