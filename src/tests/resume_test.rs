//! Resuming paused and interrupted runs

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Semaphore;

use super::request;
use super::resume_request;
use super::wait_until;
use super::FakeSource;
use super::Harness;
use super::MockProvider;
use crate::migration::ProgressStore;
use crate::models::MigrationRun;
use crate::models::MigrationStatus;
use crate::models::TableProgress;
use crate::VecMigrateError;

fn assert_no_double_embedding(h: &Harness) {
    let seen = h.provider.seen();
    let unique: HashSet<&String> = seen.iter().collect();
    assert_eq!(unique.len(), seen.len(), "a record was embedded twice");
}

/// Run `rows` docs until `before_pause` are written, then pause
async fn paused_harness(rows: usize, before_pause: usize) -> (Harness, Arc<Semaphore>) {
    let gate = Arc::new(Semaphore::new(0));
    let h = Harness::new(
        FakeSource::default().with_generated("docs", rows),
        MockProvider::default().with_gate(gate.clone()),
    );
    let manager = h.manager().await;
    manager.start(request(&["docs"], 5, 1)).await.unwrap();
    gate.add_permits(before_pause);
    wait_until(|| h.store.len() == before_pause).await;
    manager.pause().await.unwrap();
    gate.add_permits(1000);
    assert_eq!(manager.wait().await.status, MigrationStatus::Paused);
    (h, gate)
}

#[tokio::test]
async fn test_pause_then_resume_completes_without_duplicates() {
    let gate = Arc::new(Semaphore::new(0));
    let h = Harness::new(
        FakeSource::default().with_generated("docs", 10),
        MockProvider::default().with_gate(gate.clone()),
    );
    let manager = h.manager().await;

    let first = manager.start(request(&["docs"], 5, 1)).await.unwrap();
    gate.add_permits(3);
    wait_until(|| h.store.len() == 3).await;
    manager.pause().await.unwrap();
    gate.add_permits(1000);
    let paused = manager.wait().await;
    assert_eq!(paused.status, MigrationStatus::Paused);

    let resumed = manager.resume().await.unwrap();
    assert_eq!(resumed.id, first.id);
    assert_eq!(resumed.status, MigrationStatus::Processing);
    assert_eq!(resumed.current, paused.current);
    assert_eq!(resumed.total, 10);

    let run = manager.wait().await;
    assert_eq!(run.status, MigrationStatus::Completed);
    assert_eq!(run.current, 10);
    assert_eq!(h.store.len(), 10);
    assert_eq!(h.store.writes.load(Ordering::SeqCst), 10);
    assert_eq!(h.provider.call_count(), 10);
    assert_no_double_embedding(&h);
}

#[tokio::test]
async fn test_interrupted_run_reopens_paused() {
    let (h, _gate) = paused_harness(10, 4).await;

    // Simulate a crash while processing
    let mut document = h.progress.document().unwrap();
    document["status"] = json!("processing");
    h.progress.set_document(document);

    let manager = h.manager().await;
    assert_eq!(manager.get_progress().await.status, MigrationStatus::Paused);
    assert!(!manager.is_running().await);
    let raw = h.progress.document().unwrap();
    assert_eq!(raw["status"], "paused");

    manager.start(resume_request(5, 1)).await.unwrap();
    let run = manager.wait().await;
    assert_eq!(run.status, MigrationStatus::Completed);
    assert_eq!(h.store.len(), 10);
    assert_no_double_embedding(&h);
}

#[tokio::test]
async fn test_resume_never_skips_rows_missing_from_store() {
    let h = Harness::new(
        FakeSource::default().with_generated("docs", 10),
        MockProvider::default(),
    );
    h.store.seed("docs", &["1", "2", "3"]);

    // Cursor ran ahead of what actually reached the unified store
    let mut stored = MigrationRun::new(vec!["docs".to_string()], 5, 1);
    stored.status = MigrationStatus::Paused;
    stored.current = 3;
    stored.total = 10;
    let mut progress = TableProgress::new("docs", "docs", 10, 3);
    progress.offset = 10;
    stored.table_progress.insert("docs".to_string(), progress);
    h.progress.save(&stored).await.unwrap();

    let manager = h.manager().await;
    let resumed = manager.start(resume_request(5, 1)).await.unwrap();
    assert_eq!(resumed.id, stored.id);
    assert_eq!(resumed.table_progress["docs"].offset, 0);
    assert_eq!(resumed.current, 3);

    let run = manager.wait().await;
    assert_eq!(run.status, MigrationStatus::Completed);
    assert_eq!(run.current, 10);
    assert_eq!(h.provider.call_count(), 7);
    assert_eq!(h.store.len(), 10);
}

#[tokio::test]
async fn test_resume_with_new_batch_size_realigns_cursor() {
    let (h, _gate) = paused_harness(12, 6).await;
    let paused = h.persisted().await.unwrap();
    // First batch of five finished before the pause
    assert_eq!(paused.table_progress["docs"].offset, 5);

    let manager = h.manager().await;
    let resumed = manager.start(resume_request(4, 1)).await.unwrap();
    assert_eq!(resumed.batch_size, 4);
    assert_eq!(resumed.table_progress["docs"].offset % 4, 0);
    assert!(resumed.table_progress["docs"].offset <= 5);

    let run = manager.wait().await;
    assert_eq!(run.status, MigrationStatus::Completed);
    assert_eq!(h.store.len(), 12);
    assert_no_double_embedding(&h);
}

#[tokio::test]
async fn test_legacy_progress_record_is_resumable() {
    let h = Harness::new(
        FakeSource::default().with_generated("docs", 4),
        MockProvider::default(),
    );
    h.store.seed("docs", &["1", "2"]);
    h.progress.set_document(json!({
        "status": "paused",
        "tables": ["docs"],
        "currentTable": "docs",
        "current": 2,
        "total": 4,
        "tokensUsed": 20,
        "startTime": 1_700_000_000_000_i64,
        "batchSize": 2,
        "workerCount": 1,
        "tableProgress": {"docs": {"total": 4, "embedded": 2, "offset": 2}}
    }));

    let manager = h.manager().await;
    assert_eq!(manager.get_progress().await.status, MigrationStatus::Paused);

    let resumed = manager.resume().await.unwrap();
    assert_eq!(resumed.batch_size, 2);
    assert_eq!(resumed.table_progress["docs"].offset, 2);

    let run = manager.wait().await;
    assert_eq!(run.status, MigrationStatus::Completed);
    assert_eq!(run.current, 4);
    assert_eq!(h.provider.call_count(), 2);

    // Rewritten in the canonical layout
    assert_eq!(h.progress.document().unwrap()["version"], 2);
}

#[tokio::test]
async fn test_corrupt_progress_surfaces_as_error() {
    let h = Harness::new(
        FakeSource::default().with_generated("docs", 2),
        MockProvider::default(),
    );
    h.progress.set_document(json!({"status": 42, "tables": "nope"}));

    let manager = h.manager().await;
    let run = manager.get_progress().await;
    assert_eq!(run.status, MigrationStatus::Error);
    assert!(run.error.as_deref().unwrap().contains("Corrupted progress"));

    let err = manager.start(resume_request(2, 1)).await.unwrap_err();
    assert!(matches!(err, VecMigrateError::CorruptProgress(_)));
    assert!(err.is_fatal());

    // A fresh start replaces the corrupt record
    manager.start(request(&["docs"], 2, 1)).await.unwrap();
    let run = manager.wait().await;
    assert_eq!(run.status, MigrationStatus::Completed);
    assert_eq!(h.progress.document().unwrap()["version"], 2);
}

#[tokio::test]
async fn test_resume_without_paused_run_needs_tables() {
    let h = Harness::new(
        FakeSource::default().with_generated("docs", 2),
        MockProvider::default(),
    );
    let manager = h.manager().await;

    let err = manager.start(resume_request(2, 1)).await.unwrap_err();
    assert!(matches!(err, VecMigrateError::InvalidInput(_)));

    let mut with_tables = resume_request(2, 1);
    with_tables.tables = vec!["docs".to_string()];
    manager.start(with_tables).await.unwrap();
    assert_eq!(manager.wait().await.status, MigrationStatus::Completed);
}
