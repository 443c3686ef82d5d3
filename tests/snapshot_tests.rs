/// Snapshot tests
///
/// Concurrent whole-schema reads: completion order, first-failure
/// settlement, catalog validation and result shape.
/// Run with: cargo test --test snapshot_tests
mod common;

use common::{FaultyStore, init_tracing, seeded_store};
use fanstore::{Client, CoordinatorConfig, DbError, MemoryStore, SnapshotAggregator, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn aggregator<S: fanstore::StoreClient + 'static>(store: Arc<S>) -> SnapshotAggregator<S> {
    SnapshotAggregator::new(store, &CoordinatorConfig::new("app"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshot_keys_and_row_counts() {
    init_tracing();
    let store = Arc::new(seeded_store().await);

    let snapshot = assert_ok!(aggregator(store).snapshot("app").await);

    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.get("students").unwrap().row_count(), 2);
    assert_eq!(snapshot.get("jobs").unwrap().row_count(), 0);
    assert_eq!(snapshot.get("interviews").unwrap().row_count(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reverse_completion_order_gives_same_result() {
    let in_order = aggregator(Arc::new(seeded_store().await))
        .snapshot("app")
        .await
        .unwrap();

    // interviews < jobs < students in catalog order; finish them backwards
    let store = FaultyStore::new(seeded_store().await)
        .delay_read("interviews", Duration::from_millis(60))
        .delay_read("jobs", Duration::from_millis(30))
        .into_shared();
    let reversed = aggregator(store).snapshot("app").await.unwrap();

    assert_eq!(in_order, reversed);
}

#[tokio::test]
async fn test_schema_without_tables_is_not_found() {
    let store = Arc::new(MemoryStore::new("app"));

    let err = assert_err!(aggregator(store).snapshot("app").await);
    assert!(matches!(err, DbError::NotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_failed_read_yields_one_error() {
    let store = FaultyStore::new(seeded_store().await)
        .fail_read(
            "jobs",
            DbError::TableNotFound("jobs".to_string()),
        )
        .into_shared();

    let err = aggregator(store).snapshot("app").await.unwrap_err();

    match err {
        DbError::OperationFailed { operation, reason } => {
            assert_eq!(operation, "read jobs");
            assert!(reason.contains("jobs"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_failures_surface_first_only() {
    let store = FaultyStore::new(seeded_store().await)
        .fail_read("students", DbError::ConnectionError("reset".to_string()))
        .fail_read("interviews", DbError::ConnectionError("reset".to_string()))
        .fail_read("jobs", DbError::ConnectionError("reset".to_string()))
        .into_shared();

    let err = aggregator(store).snapshot("app").await.unwrap_err();
    assert_eq!(err, DbError::ConnectionError("reset".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_late_reads_finish_after_failure() {
    let store = FaultyStore::new(seeded_store().await)
        .fail_read("interviews", DbError::ConnectionError("down".to_string()))
        .delay_read("students", Duration::from_millis(50))
        .into_shared();

    let err = aggregator(Arc::clone(&store)).snapshot("app").await.unwrap_err();
    assert!(err.is_connection_error());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.reads_finished(), store.reads_started());
}

#[tokio::test]
async fn test_corrupt_catalog_entry_fails_whole_snapshot() {
    for raw in ["", "   ", "bad\0name", "students"] {
        let store = FaultyStore::new(seeded_store().await)
            .extra_table(raw)
            .into_shared();

        let err = aggregator(Arc::clone(&store)).snapshot("app").await.unwrap_err();

        assert!(matches!(err, DbError::CorruptCatalog(_)), "{raw:?}: {err:?}");
        assert_eq!(store.reads_started(), 0);
    }
}

#[tokio::test]
async fn test_duplicate_catalog_entry_names_the_table() {
    let store = FaultyStore::new(seeded_store().await)
        .extra_table("jobs")
        .into_shared();

    let err = aggregator(Arc::clone(&store)).snapshot("app").await.unwrap_err();

    assert_eq!(
        err,
        DbError::CorruptCatalog("catalog listed table 'jobs' twice".to_string())
    );
}

#[tokio::test]
async fn test_queued_reads_wait_for_a_slot() {
    let store = FaultyStore::new(seeded_store().await)
        .delay_read("students", Duration::from_millis(80))
        .delay_read("jobs", Duration::from_millis(80))
        .delay_read("interviews", Duration::from_millis(80))
        .into_shared();
    let config = CoordinatorConfig::new("app").max_in_flight(1);

    let snapshot = assert_ok!(
        SnapshotAggregator::new(Arc::clone(&store), &config)
            .snapshot("app")
            .await
    );

    assert_eq!(snapshot.len(), 3);
    assert_eq!(store.reads_finished(), 3);
}

#[tokio::test]
async fn test_unreachable_store_is_connection_error() {
    let store = seeded_store().await;
    store.set_available(false);

    let err = aggregator(Arc::new(store)).snapshot("app").await.unwrap_err();
    assert!(err.is_connection_error());
}

#[tokio::test]
async fn test_repeated_snapshots_are_equal() {
    let client = Client::new(seeded_store().await, CoordinatorConfig::new("app")).unwrap();

    let first = client.snapshot().await.unwrap();
    let second = client.snapshot().await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_read_timeout_is_operation_failure() {
    let store = FaultyStore::new(seeded_store().await)
        .delay_read("students", Duration::from_millis(200));
    let config = CoordinatorConfig::new("app").query_timeout(Duration::from_millis(20));
    let client = Client::with_query_timeout(store, config).unwrap();

    let err = client.snapshot().await.unwrap_err();

    match err {
        DbError::OperationFailed { operation, reason } => {
            assert_eq!(operation, "read students");
            assert!(reason.contains("timed out"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_snapshot_serializes_as_table_to_records() {
    let store = MemoryStore::new("app");
    store
        .create_table("students", common::student_schema())
        .await
        .unwrap();
    store
        .insert_rows("students", vec![vec![Value::Integer(7), Value::from("Ada")]])
        .await
        .unwrap();
    let client = Client::new(store, CoordinatorConfig::new("app")).unwrap();

    let snapshot = client.snapshot().await.unwrap();
    let json = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(
        json,
        serde_json::json!({ "students": [{ "id": 7, "name": "Ada" }] })
    );
}
