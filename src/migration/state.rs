//! Owner of the in-memory `MigrationRun`
//!
//! Every read-modify-write goes through one mutex, and snapshots are persisted
//! while it is held, so concurrent workers never lose updates and the stored
//! record never runs ahead of or behind memory.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::warn;

use super::store::ProgressStore;
use crate::errors::Result;
use crate::models::MigrationRun;
use crate::models::MigrationStatus;
use crate::models::ProgressReport;

struct Inner {
    run: MigrationRun,
    /// Records embedded since the last persisted snapshot
    unsaved: u64,
    /// `current` when this process started driving the run
    baseline: u64,
}

pub struct RunState {
    inner: Mutex<Inner>,
    store: Arc<dyn ProgressStore>,
    persist_every: u64,
}

impl RunState {
    pub fn new(run: MigrationRun, store: Arc<dyn ProgressStore>, persist_every: u64) -> Self {
        let baseline = run.current;
        Self {
            inner: Mutex::new(Inner {
                run,
                unsaved: 0,
                baseline,
            }),
            store,
            persist_every: persist_every.max(1),
        }
    }

    pub async fn snapshot(&self) -> MigrationRun {
        self.inner.lock().await.run.clone()
    }

    pub async fn report(&self) -> ProgressReport {
        let inner = self.inner.lock().await;
        ProgressReport::from_run(&inner.run, Utc::now(), inner.baseline)
    }

    pub async fn status(&self) -> MigrationStatus {
        self.inner.lock().await.run.status
    }

    /// Swap in a new run and persist it
    pub async fn replace(&self, run: MigrationRun) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.baseline = run.current;
        inner.run = run;
        self.persist(&mut inner).await
    }

    /// Swap in a new run without touching the store
    pub async fn reset(&self, run: MigrationRun) {
        let mut inner = self.inner.lock().await;
        inner.baseline = run.current;
        inner.unsaved = 0;
        inner.run = run;
    }

    /// Apply `f` and persist the result
    pub async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut MigrationRun) -> Result<()> + Send,
    {
        let mut inner = self.inner.lock().await;
        f(&mut inner.run)?;
        inner.run.touch();
        self.persist(&mut inner).await
    }

    /// Account one written record; persists every `persist_every` records
    pub async fn record_embedded(&self, table: &str, tokens: u64, cost: f64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.run.record_embedded(table, tokens, cost);
        inner.unsaved += 1;
        if inner.unsaved >= self.persist_every {
            self.persist(&mut inner).await?;
        }
        Ok(())
    }

    /// Account a row without embeddable text
    ///
    /// `counted` rows were part of the measured total and are taken out of it.
    pub async fn record_skipped(&self, table: &str, counted: bool) {
        let mut inner = self.inner.lock().await;
        let run = &mut inner.run;
        if counted && run.total > run.current {
            run.total -= 1;
        }
        if let Some(progress) = run.table_progress.get_mut(table) {
            progress.skipped += 1;
            if counted && progress.total_in_table > progress.embedded_count {
                progress.total_in_table -= 1;
            }
        }
    }

    pub async fn record_failure(&self, message: String) -> Result<()> {
        self.update(|run| {
            run.record_failure(message);
            Ok(())
        })
        .await
    }

    /// Latch the run-level fallback flag the first time a batch falls back
    pub async fn enter_fallback(&self, reason: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.run.fallback_mode {
            return Ok(());
        }
        inner.run.enter_fallback(reason);
        self.persist(&mut inner).await
    }

    pub async fn set_current_table(&self, table: &str) -> Result<()> {
        self.update(|run| {
            run.current_table = Some(table.to_string());
            Ok(())
        })
        .await
    }

    pub async fn table_offset(&self, table: &str) -> u64 {
        self.inner
            .lock()
            .await
            .run
            .table_progress
            .get(table)
            .map_or(0, |p| p.offset)
    }

    /// Move the table cursor past a finished batch
    pub async fn advance_offset(&self, table: &str, batch_size: usize) -> Result<()> {
        self.update(|run| {
            if let Some(progress) = run.table_progress.get_mut(table) {
                progress.advance(batch_size);
            }
            Ok(())
        })
        .await
    }

    pub async fn complete_table(&self, table: &str) -> Result<()> {
        self.update(|run| {
            if let Some(progress) = run.table_progress.get_mut(table) {
                progress.completed = true;
            }
            if !run.processed_tables.iter().any(|t| t == table) {
                run.processed_tables.push(table.to_string());
            }
            Ok(())
        })
        .await
    }

    /// Abandon one table; the rest of the run continues
    pub async fn fail_table(&self, table: &str, message: String) -> Result<()> {
        self.update(|run| {
            if let Some(progress) = run.table_progress.get_mut(table) {
                progress.failed = Some(message.clone());
            }
            run.record_failure(format!("{table}: {message}"));
            Ok(())
        })
        .await
    }

    /// Move a live run to `Error` with `message`
    pub async fn fail_run(&self, message: String) -> Result<()> {
        self.update(|run| {
            if run.status.can_transition_to(MigrationStatus::Error) {
                run.status = MigrationStatus::Error;
            }
            run.error = Some(message);
            Ok(())
        })
        .await
    }

    /// Close out a run whose workers have all returned
    pub async fn finish(&self) -> Result<MigrationRun> {
        let mut inner = self.inner.lock().await;
        if inner.run.status == MigrationStatus::Processing {
            if inner.run.all_tables_settled() {
                inner.run.transition(MigrationStatus::Completed)?;
            } else {
                warn!("Workers returned with unsettled tables; pausing run");
                inner.run.transition(MigrationStatus::Paused)?;
            }
        }
        inner.run.current_table = None;
        inner.run.touch();
        self.persist(&mut inner).await?;
        Ok(inner.run.clone())
    }

    async fn persist(&self, inner: &mut Inner) -> Result<()> {
        self.store.save(&inner.run).await?;
        inner.unsaved = 0;
        debug!(
            status = %inner.run.status,
            current = inner.run.current,
            total = inner.run.total,
            "Progress snapshot persisted"
        );
        Ok(())
    }
}
