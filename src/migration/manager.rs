//! Migration manager: run lifecycle, worker fan-out and control verbs

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::control::ControlToken;
use super::state::RunState;
use super::store::DedupIndex;
use super::store::HistoryLog;
use super::store::ProgressStore;
use super::store::SourceReader;
use super::store::UnifiedStoreWriter;
use super::tables::TableRegistry;
use super::tables::TableSpec;
use super::worker::partition;
use super::worker::run_worker;
use super::worker::WorkerContext;
use crate::embeddings::ProviderAdapter;
use crate::errors::Result;
use crate::errors::VecMigrateError;
use crate::models::resume_offset;
use crate::models::MigrationHistoryEntry;
use crate::models::MigrationRun;
use crate::models::MigrationStatus;
use crate::models::ProgressReport;
use crate::models::TableProgress;

/// Parameters of `MigrationManager::start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub tables: Vec<String>,
    pub batch_size: usize,
    pub worker_count: usize,
    pub resume: bool,
}

/// Collaborators of a manager
pub struct MigrationDeps {
    pub source: Arc<dyn SourceReader>,
    pub dedup: Arc<dyn DedupIndex>,
    pub writer: Arc<dyn UnifiedStoreWriter>,
    pub progress: Arc<dyn ProgressStore>,
    pub history: Arc<dyn HistoryLog>,
    pub adapter: Arc<ProviderAdapter>,
}

#[derive(Debug, Clone, Copy)]
pub struct ManagerSettings {
    pub persist_every: u64,
    pub content_max_chars: usize,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            persist_every: 10,
            content_max_chars: 8000,
        }
    }
}

struct ActiveRun {
    control: ControlToken,
    /// Cancelled when the driver task ends, panics included
    done: CancellationToken,
}

impl ActiveRun {
    fn is_finished(&self) -> bool {
        self.done.is_cancelled()
    }
}

pub struct MigrationManager {
    deps: MigrationDeps,
    registry: TableRegistry,
    settings: ManagerSettings,
    state: Arc<RunState>,
    active: Mutex<Option<ActiveRun>>,
}

impl MigrationManager {
    /// Build a manager around the persisted run, if any
    ///
    /// A run found `Processing` was interrupted and is restored as `Paused`;
    /// it only continues through an explicit resume.
    pub async fn open(
        deps: MigrationDeps,
        registry: TableRegistry,
        settings: ManagerSettings,
    ) -> Result<Self> {
        let persisted = match deps.progress.read_document().await? {
            Some(document) => Some(super::progress_codec::decode(document)),
            None => None,
        };

        let (run, needs_save) = match persisted {
            Some(Ok(run)) => {
                let interrupted = run.status == MigrationStatus::Processing;
                if interrupted {
                    warn!(run = %run.id, "Found interrupted migration, marking it paused");
                }
                (run.recover_after_restart(), interrupted)
            }
            Some(Err(e)) => {
                error!("Persisted migration progress is unreadable: {}", e);
                let run = MigrationRun {
                    status: MigrationStatus::Error,
                    error: Some(e.to_string()),
                    ..MigrationRun::default()
                };
                (run, false)
            }
            None => (MigrationRun::default(), false),
        };

        let state = Arc::new(RunState::new(
            run.clone(),
            deps.progress.clone(),
            settings.persist_every,
        ));
        if needs_save {
            state.replace(run.clone()).await?;
            record_history(deps.history.as_ref(), &run).await;
        }

        Ok(Self {
            deps,
            registry,
            settings,
            state,
            active: Mutex::new(None),
        })
    }

    /// Start a run, or continue the persisted paused run when `resume` is set
    ///
    /// Returns once the initial snapshot is persisted; workers continue in the
    /// background.
    pub async fn start(&self, mut request: StartRequest) -> Result<MigrationRun> {
        if request.batch_size == 0 || request.worker_count == 0 {
            return Err(VecMigrateError::InvalidInput(
                "batch size and worker count must be at least 1".to_string(),
            ));
        }
        if request.tables.is_empty() && !request.resume {
            return Err(VecMigrateError::InvalidInput(
                "at least one table is required".to_string(),
            ));
        }

        // Each table goes to exactly one worker
        dedup_in_order(&mut request.tables);

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            if !previous.is_finished() {
                if self.state.status().await == MigrationStatus::Processing {
                    *active = Some(previous);
                    return Err(VecMigrateError::AlreadyRunning);
                }
                // Paused or stopped: let the in-flight records land first
                previous.done.cancelled().await;
            }
        }

        let resumable = if request.resume {
            match self.deps.progress.load().await {
                Ok(Some(run)) if run.status == MigrationStatus::Paused => Some(run),
                Ok(_) => None,
                Err(e) => {
                    self.state.reset(self.errored_run(&e)).await;
                    return Err(e);
                }
            }
        } else {
            None
        };

        let mut run = match resumable {
            Some(previous) => self.prepare_resume(previous, &request).await?,
            None => {
                if request.tables.is_empty() {
                    return Err(VecMigrateError::InvalidInput(
                        "no paused migration to resume and no tables given".to_string(),
                    ));
                }
                self.prepare_fresh(&request).await?
            }
        };

        run.transition(MigrationStatus::Processing)?;
        run.start_time = Some(Utc::now());
        self.state.replace(run.clone()).await?;
        record_history(self.deps.history.as_ref(), &run).await;

        info!(
            run = %run.id,
            tables = ?run.tables,
            current = run.current,
            total = run.total,
            batch_size = run.batch_size,
            workers = run.worker_count,
            "Migration started"
        );

        let control = ControlToken::new();
        let done = CancellationToken::new();
        self.spawn_driver(&run, control.clone(), done.clone());
        *active = Some(ActiveRun { control, done });

        Ok(run)
    }

    /// Continue the persisted paused run
    pub async fn resume(&self) -> Result<MigrationRun> {
        let run = self.state.snapshot().await;
        self.start(StartRequest {
            tables: Vec::new(),
            batch_size: if run.batch_size == 0 { 50 } else { run.batch_size },
            worker_count: run.worker_count.max(1),
            resume: true,
        })
        .await
    }

    /// Checkpoint the run; workers stop after their in-flight record
    pub async fn pause(&self) -> Result<MigrationRun> {
        self.state
            .update(|run| run.transition(MigrationStatus::Paused))
            .await?;
        if let Some(active) = self.active.lock().await.as_ref() {
            active.control.pause();
        }
        info!("Migration paused");
        let run = self.state.snapshot().await;
        record_history(self.deps.history.as_ref(), &run).await;
        Ok(run)
    }

    /// Abandon the run; the next start begins from fresh cursors
    pub async fn stop(&self) -> Result<MigrationRun> {
        self.state
            .update(|run| run.transition(MigrationStatus::Stopped))
            .await?;
        if let Some(active) = self.active.lock().await.as_ref() {
            active.control.stop();
        }
        info!("Migration stopped");
        let run = self.state.snapshot().await;
        record_history(self.deps.history.as_ref(), &run).await;
        Ok(run)
    }

    /// Reset to an idle run and delete the persisted record
    pub async fn clear(&self) -> Result<()> {
        let active = self.active.lock().await;
        if active.as_ref().is_some_and(|a| !a.is_finished()) {
            return Err(VecMigrateError::InvalidState(
                "cannot clear progress while a migration is running".to_string(),
            ));
        }
        self.deps.progress.clear().await?;
        self.state.reset(MigrationRun::default()).await;
        info!("Migration progress cleared");
        Ok(())
    }

    /// Best-known snapshot of the run
    pub async fn get_progress(&self) -> MigrationRun {
        self.state.snapshot().await
    }

    /// Snapshot with percentage, speed and ETA
    pub async fn progress_report(&self) -> ProgressReport {
        self.state.report().await
    }

    /// Wait until the workers of the current run have returned
    pub async fn wait(&self) -> MigrationRun {
        let done = self.active.lock().await.as_ref().map(|a| a.done.clone());
        if let Some(done) = done {
            done.cancelled().await;
        }
        self.state.snapshot().await
    }

    /// Most recent runs from the history log
    pub async fn history(
        &self,
        status: Option<MigrationStatus>,
        limit: usize,
    ) -> Result<Vec<MigrationHistoryEntry>> {
        self.deps.history.list(status, limit).await
    }

    /// Whether workers of a run are still active
    pub async fn is_running(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|a| !a.is_finished())
    }

    fn errored_run(&self, e: &VecMigrateError) -> MigrationRun {
        MigrationRun {
            status: MigrationStatus::Error,
            error: Some(e.to_string()),
            provider: self.deps.adapter.provider_name().to_string(),
            model: self.deps.adapter.model().to_string(),
            ..MigrationRun::default()
        }
    }

    fn new_run(&self, tables: Vec<String>, request: &StartRequest) -> MigrationRun {
        let mut run = MigrationRun::new(tables, request.batch_size, request.worker_count);
        run.provider = self.deps.adapter.provider_name().to_string();
        run.model = self.deps.adapter.model().to_string();
        run
    }

    /// Count rows and already-embedded ids so progress starts at the true position
    async fn prepare_fresh(&self, request: &StartRequest) -> Result<MigrationRun> {
        let mut run = self.new_run(request.tables.clone(), request);

        for name in &request.tables {
            let progress = match self.measure_table(name).await {
                Ok(progress) => progress,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(table = %name, "Cannot prepare table: {}", e);
                    run.record_failure(format!("{name}: {e}"));
                    TableProgress {
                        failed: Some(e.to_string()),
                        ..TableProgress::new(name, name, 0, 0)
                    }
                }
            };
            run.total += progress.total_in_table;
            run.current += progress.embedded_count;
            run.table_progress.insert(name.clone(), progress);
        }

        Ok(run)
    }

    /// Re-derive counters from the unified store and re-align the cursors
    async fn prepare_resume(
        &self,
        previous: MigrationRun,
        request: &StartRequest,
    ) -> Result<MigrationRun> {
        let mut run = previous;
        dedup_in_order(&mut run.tables);
        run.batch_size = request.batch_size;
        run.worker_count = request.worker_count;
        run.provider = self.deps.adapter.provider_name().to_string();
        run.model = self.deps.adapter.model().to_string();
        run.current = 0;
        run.total = 0;

        for name in run.tables.clone() {
            let stored = run.table_progress.remove(&name);
            let mut progress = match self.measure_table(&name).await {
                Ok(progress) => progress,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(table = %name, "Cannot prepare table: {}", e);
                    run.record_failure(format!("{name}: {e}"));
                    TableProgress {
                        failed: Some(e.to_string()),
                        ..TableProgress::new(&name, &name, 0, 0)
                    }
                }
            };

            if let Some(stored) = stored {
                let realigned = resume_offset(stored.offset, request.batch_size);
                progress.offset =
                    realigned.min(resume_offset(progress.embedded_count, request.batch_size));
                progress.completed = stored.completed && progress.failed.is_none();
                progress.skipped = stored.skipped;
            }

            run.total += progress.total_in_table;
            run.current += progress.embedded_count;
            run.table_progress.insert(name, progress);
        }

        info!(
            run = %run.id,
            current = run.current,
            total = run.total,
            "Resuming paused migration"
        );
        Ok(run)
    }

    async fn measure_table(&self, name: &str) -> Result<TableProgress> {
        let spec = self.registry.resolve(name)?;
        let total = self.deps.source.count_rows(&spec).await?;
        let embedded = self.deps.dedup.embedded_count(&spec.display_name).await?;
        Ok(TableProgress::new(
            &spec.name,
            &spec.display_name,
            total.max(embedded),
            embedded,
        ))
    }

    fn spawn_driver(&self, run: &MigrationRun, control: ControlToken, done: CancellationToken) {
        let pending: Vec<TableSpec> = run
            .tables
            .iter()
            .filter(|t| !run.table_progress.get(*t).is_some_and(TableProgress::is_settled))
            .filter_map(|t| self.registry.resolve(t).ok())
            .collect();

        let ctx = Arc::new(WorkerContext {
            source: self.deps.source.clone(),
            dedup: self.deps.dedup.clone(),
            writer: self.deps.writer.clone(),
            adapter: self.deps.adapter.clone(),
            state: self.state.clone(),
            control: control.clone(),
            batch_size: run.batch_size,
            content_max_chars: self.settings.content_max_chars,
        });
        let groups = partition(pending, run.worker_count);
        let state = self.state.clone();
        let history = self.deps.history.clone();

        tokio::spawn(async move {
            let _finished = done.drop_guard();
            let mut workers = tokio::task::JoinSet::new();
            for (worker_id, tables) in groups.into_iter().enumerate() {
                workers.spawn(run_worker(ctx.clone(), worker_id, tables));
            }

            while let Some(joined) = workers.join_next().await {
                let failure = match joined {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e.to_string()),
                    Err(e) => Some(format!("worker task failed: {e}")),
                };
                if let Some(message) = failure {
                    error!("Migration aborted: {}", message);
                    if let Err(e) = state.fail_run(message).await {
                        error!("Failed to persist migration error: {}", e);
                    }
                    control.stop();
                }
            }

            match state.finish().await {
                Ok(run) => {
                    info!(
                        status = %run.status,
                        current = run.current,
                        total = run.total,
                        errors = run.error_count,
                        "Migration finished"
                    );
                    record_history(history.as_ref(), &run).await;
                }
                Err(e) => error!("Failed to persist final migration state: {}", e),
            }
        });
    }
}

/// Drop repeated names, keeping the first occurrence
fn dedup_in_order(tables: &mut Vec<String>) {
    let mut seen = HashSet::new();
    tables.retain(|t| seen.insert(t.clone()));
}

/// History is best effort: a failed write never affects the run
async fn record_history(history: &dyn HistoryLog, run: &MigrationRun) {
    let entry = MigrationHistoryEntry::from_run(run, Utc::now());
    if let Err(e) = history.record(&entry).await {
        warn!(run = %run.id, "Failed to record migration history: {}", e);
    }
}
