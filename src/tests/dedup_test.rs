//! Rows already in the unified store are never sent to the provider again

use std::sync::atomic::Ordering;

use super::request;
use super::FakeSource;
use super::Harness;
use super::MockProvider;
use crate::config::TableConfig;
use crate::migration::TableRegistry;
use crate::models::MigrationStatus;

fn invoices() -> FakeSource {
    FakeSource::default().with_table(
        "invoices",
        &[
            ("1", Some("Invoice one")),
            ("2", Some("Invoice two")),
            ("3", Some("Invoice three")),
        ],
    )
}

#[tokio::test]
async fn test_pre_embedded_row_is_not_resubmitted() {
    let h = Harness::new(invoices(), MockProvider::default());
    h.store.seed("invoices", &["2"]);
    let manager = h.manager().await;

    let started = manager.start(request(&["invoices"], 10, 1)).await.unwrap();
    assert_eq!(started.current, 1);
    assert_eq!(started.total, 3);

    let run = manager.wait().await;
    assert_eq!(run.status, MigrationStatus::Completed);
    assert_eq!(run.current, 3);
    assert_eq!(h.provider.call_count(), 2);
    assert!(!h.provider.seen().contains(&"Invoice two".to_string()));
    // The existing row is left as it was
    assert_eq!(h.store.get("invoices", "2").unwrap().model_used, "seed");
    assert_eq!(h.store.writes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_batch_with_k_embedded_calls_provider_n_minus_k_times() {
    let h = Harness::new(
        FakeSource::default().with_generated("docs", 10),
        MockProvider::default(),
    );
    h.store.seed("docs", &["2", "4", "6"]);
    let manager = h.manager().await;

    manager.start(request(&["docs"], 10, 1)).await.unwrap();
    let run = manager.wait().await;

    assert_eq!(run.status, MigrationStatus::Completed);
    assert_eq!(h.provider.call_count(), 7);
    assert_eq!(run.current, 10);
}

#[tokio::test]
async fn test_rerunning_a_completed_migration_is_a_no_op() {
    let h = Harness::new(invoices(), MockProvider::default());
    let manager = h.manager().await;

    manager.start(request(&["invoices"], 2, 1)).await.unwrap();
    manager.wait().await;
    let calls = h.provider.call_count();
    let writes = h.store.writes.load(Ordering::SeqCst);

    let again = manager.start(request(&["invoices"], 2, 1)).await.unwrap();
    assert_eq!(again.current, 3);
    assert_eq!(again.total, 3);

    let run = manager.wait().await;
    assert_eq!(run.status, MigrationStatus::Completed);
    assert_eq!(h.provider.call_count(), calls);
    assert_eq!(h.store.writes.load(Ordering::SeqCst), writes);
    assert_eq!(h.store.len(), 3);
}

#[tokio::test]
async fn test_display_name_keys_the_unified_store() {
    let h = Harness::new(invoices(), MockProvider::default());
    h.store.seed("Invoices", &["1"]);
    let registry = TableRegistry::from_config(&[TableConfig {
        name: "invoices".to_string(),
        display_name: Some("Invoices".to_string()),
        content: "content".to_string(),
        id_column: None,
    }])
    .unwrap();
    let manager = h.manager_with(registry).await;

    let started = manager.start(request(&["invoices"], 5, 1)).await.unwrap();
    assert_eq!(started.current, 1);

    let run = manager.wait().await;
    assert_eq!(run.status, MigrationStatus::Completed);
    assert_eq!(h.provider.call_count(), 2);
    assert!(h.store.get("invoices", "2").is_none());
    let record = h.store.get("Invoices", "2").unwrap();
    assert_eq!(record.metadata["table"], "invoices");
    // Progress stays keyed by the source table name
    assert_eq!(run.table_progress["invoices"].display_name, "Invoices");
}
