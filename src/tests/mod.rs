//! In-memory collaborators for driving the migration pipeline in tests

pub mod dedup_test;
pub mod resume_test;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::embeddings::EmbeddingProvider;
use crate::embeddings::ProviderAdapter;
use crate::embeddings::ProviderOutput;
use crate::errors::ProviderError;
use crate::migration::DedupIndex;
use crate::migration::HistoryLog;
use crate::migration::ManagerSettings;
use crate::migration::MigrationDeps;
use crate::migration::MigrationManager;
use crate::migration::ProgressStore;
use crate::migration::SourceReader;
use crate::migration::StartRequest;
use crate::migration::TableRegistry;
use crate::migration::TableSpec;
use crate::migration::UnifiedStoreWriter;
use crate::models::MigrationHistoryEntry;
use crate::models::MigrationStatus;
use crate::models::SourcePage;
use crate::models::SourceRow;
use crate::models::UnifiedEmbeddingRecord;
use crate::models::SOURCE_TYPE_DATABASE;
use crate::Result;
use crate::VecMigrateError;

pub const MOCK_DIMENSION: usize = 8;

/// Row of a fake source table; `id` is `None` for a NULL key
#[derive(Debug, Clone)]
struct FakeRow {
    id: Option<String>,
    text: Option<String>,
}

/// Source tables held in memory, ordered by insertion
#[derive(Default)]
pub struct FakeSource {
    tables: Mutex<HashMap<String, Vec<FakeRow>>>,
}

impl FakeSource {
    pub fn with_table(self, name: &str, rows: &[(&str, Option<&str>)]) -> Self {
        let rows: Vec<(Option<&str>, Option<&str>)> =
            rows.iter().map(|(id, text)| (Some(*id), *text)).collect();
        self.with_rows(name, &rows)
    }

    /// Rows whose key column may be NULL
    pub fn with_rows(self, name: &str, rows: &[(Option<&str>, Option<&str>)]) -> Self {
        self.tables.lock().unwrap().insert(
            name.to_string(),
            rows.iter()
                .map(|(id, text)| FakeRow {
                    id: id.map(str::to_string),
                    text: text.map(str::to_string),
                })
                .collect(),
        );
        self
    }

    /// `n` rows with ids `1..=n` and text `"<name> row <id>"`
    pub fn with_generated(self, name: &str, n: usize) -> Self {
        let rows: Vec<(String, String)> = (1..=n)
            .map(|i| (i.to_string(), format!("{name} row {i}")))
            .collect();
        let borrowed: Vec<(&str, Option<&str>)> = rows
            .iter()
            .map(|(id, text)| (id.as_str(), Some(text.as_str())))
            .collect();
        self.with_table(name, &borrowed)
    }

    fn rows(&self, table: &TableSpec) -> Result<Vec<FakeRow>> {
        self.tables
            .lock()
            .unwrap()
            .get(&table.name)
            .cloned()
            .ok_or_else(|| {
                VecMigrateError::InvalidInput(format!(
                    "relation \"{}\" does not exist",
                    table.name
                ))
            })
    }
}

#[async_trait]
impl SourceReader for FakeSource {
    async fn count_rows(&self, table: &TableSpec) -> Result<u64> {
        Ok(self
            .rows(table)?
            .into_iter()
            .filter(|r| {
                SourceRow {
                    id: String::new(),
                    text: r.text.clone(),
                }
                .is_counted()
            })
            .count() as u64)
    }

    async fn fetch_batch(
        &self,
        table: &TableSpec,
        offset: u64,
        limit: usize,
    ) -> Result<SourcePage> {
        let page: Vec<FakeRow> = self
            .rows(table)?
            .into_iter()
            .skip(offset as usize)
            .take(limit)
            .collect();
        let fetched = page.len();
        let rows = page
            .into_iter()
            .filter_map(|r| r.id.map(|id| SourceRow { id, text: r.text }))
            .collect();
        Ok(SourcePage { rows, fetched })
    }
}

/// Unified store keyed by `(source_table, source_id)`, also serving as dedup index
#[derive(Default)]
pub struct MemoryUnifiedStore {
    records: Mutex<BTreeMap<(String, String), UnifiedEmbeddingRecord>>,
    pub writes: AtomicUsize,
}

impl MemoryUnifiedStore {
    /// Mark `ids` of `table` as already embedded
    pub fn seed(&self, table: &str, ids: &[&str]) {
        let mut records = self.records.lock().unwrap();
        for id in ids {
            let now = chrono::Utc::now();
            records.insert(
                (table.to_string(), (*id).to_string()),
                UnifiedEmbeddingRecord {
                    source_table: table.to_string(),
                    source_type: SOURCE_TYPE_DATABASE.to_string(),
                    source_id: (*id).to_string(),
                    content: format!("seeded {id}"),
                    embedding: vec![0.0; MOCK_DIMENSION],
                    model_used: "seed".to_string(),
                    tokens_used: 0,
                    metadata: serde_json::json!({}),
                    created_at: now,
                    updated_at: now,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn get(&self, table: &str, id: &str) -> Option<UnifiedEmbeddingRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&(table.to_string(), id.to_string()))
            .cloned()
    }

    pub fn all(&self) -> Vec<UnifiedEmbeddingRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl UnifiedStoreWriter for MemoryUnifiedStore {
    async fn upsert(&self, record: &UnifiedEmbeddingRecord) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().insert(
            (record.source_table.clone(), record.source_id.clone()),
            record.clone(),
        );
        Ok(())
    }
}

#[async_trait]
impl DedupIndex for MemoryUnifiedStore {
    async fn already_embedded(
        &self,
        source_table: &str,
        ids: &[String],
    ) -> Result<HashSet<String>> {
        let records = self.records.lock().unwrap();
        Ok(ids
            .iter()
            .filter(|id| records.contains_key(&(source_table.to_string(), (*id).clone())))
            .cloned()
            .collect())
    }

    async fn embedded_count(&self, source_table: &str) -> Result<u64> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .keys()
            .filter(|(table, _)| table == source_table)
            .count() as u64)
    }
}

/// Progress document kept in memory
#[derive(Default)]
pub struct MemoryProgressStore {
    document: Mutex<Option<serde_json::Value>>,
    pub saves: AtomicUsize,
}

impl MemoryProgressStore {
    pub fn set_document(&self, document: serde_json::Value) {
        *self.document.lock().unwrap() = Some(document);
    }

    pub fn document(&self) -> Option<serde_json::Value> {
        self.document.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn write_document(&self, document: serde_json::Value) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.document.lock().unwrap() = Some(document);
        Ok(())
    }

    async fn read_document(&self) -> Result<Option<serde_json::Value>> {
        Ok(self.document.lock().unwrap().clone())
    }

    async fn clear(&self) -> Result<()> {
        *self.document.lock().unwrap() = None;
        Ok(())
    }
}

/// History log kept in memory, one entry per run id
#[derive(Default)]
pub struct MemoryHistoryLog {
    entries: Mutex<Vec<MigrationHistoryEntry>>,
    pub writes: AtomicUsize,
}

impl MemoryHistoryLog {
    pub fn entries(&self) -> Vec<MigrationHistoryEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryLog for MemoryHistoryLog {
    async fn record(&self, entry: &MigrationHistoryEntry) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap();
        match entries.iter_mut().find(|e| e.run_id == entry.run_id) {
            Some(existing) => {
                let started_at = existing.started_at;
                *existing = entry.clone();
                existing.started_at = started_at;
                existing.duration_seconds = MigrationHistoryEntry::seconds_between(
                    started_at,
                    entry.completed_at.unwrap_or_else(chrono::Utc::now),
                );
            }
            None => entries.push(entry.clone()),
        }
        Ok(())
    }

    async fn list(
        &self,
        status: Option<MigrationStatus>,
        limit: usize,
    ) -> Result<Vec<MigrationHistoryEntry>> {
        let mut entries: Vec<MigrationHistoryEntry> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        entries.truncate(limit);
        Ok(entries)
    }
}

/// Provider with a call counter, optional delay, scripted failures and a gate
pub struct MockProvider {
    pub calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
    script: Mutex<VecDeque<ProviderError>>,
    failing: Mutex<HashMap<String, ProviderError>>,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    max_batch: usize,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            failing: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            gate: None,
            max_batch: 100,
        }
    }
}

impl MockProvider {
    /// Failures returned, in order, by the next calls
    pub fn with_script(self, errors: Vec<ProviderError>) -> Self {
        *self.script.lock().unwrap() = errors.into();
        self
    }

    /// Every call containing `text` fails with `error`
    pub fn failing_on(self, text: &str, error: ProviderError) -> Self {
        self.failing.lock().unwrap().insert(text.to_string(), error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Each call consumes one permit of `gate` before answering
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every text submitted so far, in call order
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

/// Deterministic non-zero vector for `text`
pub fn mock_vector(text: &str) -> Vec<f32> {
    let seed = text.bytes().fold(7u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
    (0..MOCK_DIMENSION)
        .map(|i| ((seed.wrapping_add(i as u32) % 97) as f32 + 1.0) / 100.0)
        .collect()
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-embed-v1"
    }

    fn dimension(&self) -> usize {
        MOCK_DIMENSION
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    fn price_per_1k_tokens(&self) -> f64 {
        0.5
    }

    async fn embed(&self, texts: &[String]) -> std::result::Result<ProviderOutput, ProviderError> {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().extend(texts.iter().cloned());

        if let Some(error) = self.script.lock().unwrap().pop_front() {
            return Err(error);
        }
        {
            let failing = self.failing.lock().unwrap();
            if let Some(error) = texts.iter().find_map(|t| failing.get(t)) {
                return Err(error.clone());
            }
        }

        Ok(ProviderOutput {
            vectors: texts.iter().map(|t| mock_vector(t)).collect(),
            tokens_used: 10 * texts.len() as u64,
        })
    }
}

/// One set of fakes shared by every manager opened in a test
pub struct Harness {
    pub source: Arc<FakeSource>,
    pub store: Arc<MemoryUnifiedStore>,
    pub progress: Arc<MemoryProgressStore>,
    pub history: Arc<MemoryHistoryLog>,
    pub provider: Arc<MockProvider>,
}

impl Harness {
    pub fn new(source: FakeSource, provider: MockProvider) -> Self {
        Self {
            source: Arc::new(source),
            store: Arc::new(MemoryUnifiedStore::default()),
            progress: Arc::new(MemoryProgressStore::default()),
            history: Arc::new(MemoryHistoryLog::default()),
            provider: Arc::new(provider),
        }
    }

    pub fn deps(&self) -> MigrationDeps {
        let adapter = ProviderAdapter::new(self.provider.clone())
            .with_retries(2, Duration::from_millis(1));
        MigrationDeps {
            source: self.source.clone(),
            dedup: self.store.clone(),
            writer: self.store.clone(),
            progress: self.progress.clone(),
            history: self.history.clone(),
            adapter: Arc::new(adapter),
        }
    }

    /// Manager over the fakes, persisting after every record
    pub async fn manager(&self) -> MigrationManager {
        self.manager_with(TableRegistry::default()).await
    }

    pub async fn manager_with(&self, registry: TableRegistry) -> MigrationManager {
        MigrationManager::open(
            self.deps(),
            registry,
            ManagerSettings {
                persist_every: 1,
                content_max_chars: 8000,
            },
        )
        .await
        .unwrap()
    }

    /// Persisted run as the store would hand it back after a restart
    pub async fn persisted(&self) -> Option<crate::models::MigrationRun> {
        self.progress.load().await.unwrap()
    }
}

pub fn request(tables: &[&str], batch_size: usize, worker_count: usize) -> StartRequest {
    StartRequest {
        tables: tables.iter().map(|t| (*t).to_string()).collect(),
        batch_size,
        worker_count,
        resume: false,
    }
}

pub fn resume_request(batch_size: usize, worker_count: usize) -> StartRequest {
    StartRequest {
        tables: Vec::new(),
        batch_size,
        worker_count,
        resume: true,
    }
}

/// Poll `condition` until it holds, failing the test after five seconds
pub async fn wait_until<F>(condition: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}
