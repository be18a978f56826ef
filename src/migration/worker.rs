//! Per-table processing loop run by each worker

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::control::ControlToken;
use super::state::RunState;
use super::store::DedupIndex;
use super::store::SourceReader;
use super::store::UnifiedStoreWriter;
use super::tables::TableSpec;
use crate::embeddings::adapter::AdapterSession;
use crate::embeddings::text_preprocessing::prepare_content;
use crate::embeddings::EmbeddingSource;
use crate::embeddings::ProviderAdapter;
use crate::errors::Result;
use crate::errors::VecMigrateError;
use crate::models::SourceRow;
use crate::models::UnifiedEmbeddingRecord;
use crate::models::SOURCE_TYPE_DATABASE;

/// Everything a worker needs, shared by all workers of a run
pub(crate) struct WorkerContext {
    pub source: Arc<dyn SourceReader>,
    pub dedup: Arc<dyn DedupIndex>,
    pub writer: Arc<dyn UnifiedStoreWriter>,
    pub adapter: Arc<ProviderAdapter>,
    pub state: Arc<RunState>,
    pub control: ControlToken,
    pub batch_size: usize,
    pub content_max_chars: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableOutcome {
    Exhausted,
    Halted,
}

enum RecordOutcome {
    Embedded,
    Skipped,
    Failed,
    Halted,
}

/// Split tables round-robin across at most `worker_count` workers
pub(crate) fn partition(tables: Vec<TableSpec>, worker_count: usize) -> Vec<Vec<TableSpec>> {
    let workers = worker_count.max(1).min(tables.len());
    let mut groups: Vec<Vec<TableSpec>> = vec![Vec::new(); workers];
    for (i, table) in tables.into_iter().enumerate() {
        groups[i % workers].push(table);
    }
    groups
}

/// Process the assigned tables in order; only fatal errors are returned
pub(crate) async fn run_worker(
    ctx: Arc<WorkerContext>,
    worker_id: usize,
    tables: Vec<TableSpec>,
) -> Result<()> {
    for table in tables {
        if ctx.control.should_halt() {
            break;
        }

        info!(worker = worker_id, table = %table.name, "Processing table");
        match process_table(&ctx, &table).await {
            Ok(TableOutcome::Exhausted) => {
                ctx.state.complete_table(&table.name).await?;
                info!(worker = worker_id, table = %table.name, "Table complete");
            }
            Ok(TableOutcome::Halted) => {
                info!(worker = worker_id, table = %table.name, "Worker halted by control signal");
                break;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!(worker = worker_id, table = %table.name, "Table failed: {}", e);
                ctx.state.fail_table(&table.name, e.to_string()).await?;
            }
        }
    }
    Ok(())
}

async fn process_table(ctx: &WorkerContext, table: &TableSpec) -> Result<TableOutcome> {
    ctx.state.set_current_table(&table.name).await?;
    let mut offset = ctx.state.table_offset(&table.name).await;

    loop {
        if ctx.control.should_halt() {
            return Ok(TableOutcome::Halted);
        }

        let page = ctx
            .source
            .fetch_batch(table, offset, ctx.batch_size)
            .await?;
        if page.fetched == 0 {
            return Ok(TableOutcome::Exhausted);
        }
        let fetched = page.fetched;
        for _ in 0..page.missing_ids() {
            ctx.state
                .record_failure(format!(
                    "{}: row without id in batch at offset {offset}",
                    table.name
                ))
                .await?;
        }
        let rows = page.rows;

        if ctx.control.should_halt() {
            return Ok(TableOutcome::Halted);
        }

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let done = ctx
            .dedup
            .already_embedded(&table.display_name, &ids)
            .await?;
        debug!(
            table = %table.name,
            offset,
            batch = fetched,
            duplicates = done.len(),
            "Fetched batch"
        );

        let mut session = ctx.adapter.session(ctx.control.cancellation());
        for row in rows {
            if done.contains(&row.id) {
                continue;
            }
            if let RecordOutcome::Halted = process_record(ctx, table, &mut session, row).await? {
                return Ok(TableOutcome::Halted);
            }
            if let Some(reason) = session.fallback_reason() {
                ctx.state.enter_fallback(reason).await?;
            }
            if ctx.control.should_halt() {
                return Ok(TableOutcome::Halted);
            }
        }

        ctx.state
            .advance_offset(&table.name, ctx.batch_size)
            .await?;
        offset += ctx.batch_size as u64;

        if fetched < ctx.batch_size {
            return Ok(TableOutcome::Exhausted);
        }
    }
}

async fn process_record(
    ctx: &WorkerContext,
    table: &TableSpec,
    session: &mut AdapterSession<'_>,
    row: SourceRow,
) -> Result<RecordOutcome> {
    let Some(content) = row
        .text
        .as_deref()
        .and_then(|t| prepare_content(t, ctx.content_max_chars))
    else {
        debug!(table = %table.name, id = %row.id, "Skipping record without text");
        ctx.state
            .record_skipped(&table.name, row.is_counted())
            .await;
        return Ok(RecordOutcome::Skipped);
    };

    match embed_and_store(ctx, table, session, &row.id, content).await {
        Ok(()) => Ok(RecordOutcome::Embedded),
        Err(e) if e.is_fatal() => Err(e),
        // A retry backoff interrupted by pause or stop; the record is picked up on resume
        Err(VecMigrateError::Provider(_)) if ctx.control.should_halt() => Ok(RecordOutcome::Halted),
        Err(e) => {
            warn!(table = %table.name, id = %row.id, "Record failed: {}", e);
            ctx.state
                .record_failure(format!("{} #{}: {}", table.name, row.id, e))
                .await?;
            Ok(RecordOutcome::Failed)
        }
    }
}

async fn embed_and_store(
    ctx: &WorkerContext,
    table: &TableSpec,
    session: &mut AdapterSession<'_>,
    id: &str,
    content: String,
) -> Result<()> {
    let embedded = session
        .embed(std::slice::from_ref(&content))
        .await?
        .pop()
        .ok_or_else(|| VecMigrateError::EmbeddingError("provider returned no vector".into()))?;

    let source = match embedded.source {
        EmbeddingSource::Provider => "provider",
        EmbeddingSource::Cache => "cache",
        EmbeddingSource::Fallback => "fallback",
    };
    let now = Utc::now();
    let record = UnifiedEmbeddingRecord {
        source_table: table.display_name.clone(),
        source_type: SOURCE_TYPE_DATABASE.to_string(),
        source_id: id.to_string(),
        content,
        embedding: embedded.vector,
        model_used: embedded.model_used,
        tokens_used: embedded.tokens_used,
        metadata: json!({
            "table": table.name,
            "embedding_source": source,
        }),
        created_at: now,
        updated_at: now,
    };

    ctx.writer.upsert(&record).await?;
    ctx.state
        .record_embedded(
            &table.name,
            embedded.tokens_used,
            ctx.adapter.cost_of(embedded.tokens_used),
        )
        .await
}
