//! Contract tests for BuildLedger.
//!
//! These tests verify the behavioral contract of the storage trait using the
//! in-memory fake, then mirror the same checks against SurrealBuildLedger.

use std::sync::Arc;

use build_ledger::fakes::MemoryBuildLedger;
use build_ledger::{BuildId, BuildLedger, StorageError, SurrealBuildLedger};

// ===========================================================================
// MemoryBuildLedger contract tests
// ===========================================================================

#[tokio::test]
async fn ledger_first_append_gets_build_one() {
    let ledger = MemoryBuildLedger::new();
    let record = ledger.append("foo", "Page", "1").await.unwrap();

    assert_eq!(record.build_id, BuildId(1));
    assert_eq!(record.destination, "foo");
    assert_eq!(record.entity_type, "Page");
    assert_eq!(record.entity_id, "1");
}

#[tokio::test]
async fn ledger_latest_build_none_when_empty() {
    let ledger = MemoryBuildLedger::new();
    assert_eq!(ledger.latest_build("foo").await.unwrap(), None);
}

#[tokio::test]
async fn ledger_counter_is_shared_across_destinations() {
    let ledger = MemoryBuildLedger::new();
    ledger.append("foo", "Page", "1").await.unwrap();
    ledger.append("foo", "Page", "2").await.unwrap();
    let third = ledger.append("bar", "Page", "1").await.unwrap();
    let fourth = ledger.append("bar", "Page", "3").await.unwrap();

    assert_eq!(third.build_id, BuildId(3));
    assert_eq!(fourth.build_id, BuildId(4));
    assert_eq!(ledger.latest_build("foo").await.unwrap(), Some(BuildId(2)));
    assert_eq!(ledger.latest_build("bar").await.unwrap(), Some(BuildId(4)));
}

#[tokio::test]
async fn ledger_records_between_is_inclusive_and_scoped() {
    let ledger = MemoryBuildLedger::new();
    ledger.append("foo", "Page", "1").await.unwrap();
    ledger.append("bar", "Page", "x").await.unwrap();
    ledger.append("foo", "Page", "2").await.unwrap();
    ledger.append("foo", "Article", "9").await.unwrap();

    let records = ledger
        .records_between("foo", BuildId(1), BuildId(3))
        .await
        .unwrap();
    let ids: Vec<i64> = records.iter().map(|r| r.build_id.value()).collect();
    assert_eq!(ids, vec![1, 3]);
    assert!(records.iter().all(|r| r.destination == "foo"));
}

#[tokio::test]
async fn ledger_records_between_empty_for_unknown_destination() {
    let ledger = MemoryBuildLedger::new();
    ledger.append("foo", "Page", "1").await.unwrap();

    let records = ledger
        .records_between("baz", BuildId::NONE, BuildId(10))
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn ledger_unavailable_store_fails_append() {
    let ledger = MemoryBuildLedger::new();
    ledger.set_unavailable(true);

    let err = ledger.append("foo", "Page", "1").await.unwrap_err();
    assert!(matches!(err, StorageError::Connection(_)));
    assert!(ledger.records().is_empty());
}

#[tokio::test]
async fn ledger_concurrent_appends_never_collide() {
    let ledger = Arc::new(MemoryBuildLedger::new());

    let mut handles = Vec::new();
    for i in 0..32 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            let destination = if i % 2 == 0 { "foo" } else { "bar" };
            ledger
                .append(destination, "Page", &i.to_string())
                .await
                .unwrap()
                .build_id
        }));
    }

    let mut ids: Vec<i64> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap().value())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=32).collect::<Vec<_>>());
}

#[test]
fn build_id_sentinel_is_minus_one() {
    assert_eq!(BuildId::NONE, BuildId(-1));
    assert!(BuildId::NONE.is_none());
    assert!(!BuildId(0).is_none());
    assert_eq!(serde_json::to_string(&BuildId(7)).unwrap(), "7");
    assert_eq!(BuildId(7).to_string(), "7");
}

// ===========================================================================
// SurrealBuildLedger contract tests (mirrors MemoryBuildLedger tests above)
// ===========================================================================

mod surreal_ledger_tests {
    use super::*;

    async fn ledger() -> SurrealBuildLedger {
        SurrealBuildLedger::in_memory()
            .await
            .expect("in_memory() failed")
    }

    #[tokio::test]
    async fn first_append_gets_build_one() {
        let ledger = ledger().await;
        let record = ledger.append("foo", "Page", "1").await.unwrap();

        assert_eq!(record.build_id, BuildId(1));
        assert_eq!(record.entity_type, "Page");
        assert_eq!(record.entity_id, "1");
    }

    #[tokio::test]
    async fn latest_build_none_when_empty() {
        let ledger = ledger().await;
        assert_eq!(ledger.latest_build("foo").await.unwrap(), None);
    }

    #[tokio::test]
    async fn counter_is_shared_across_destinations() {
        let ledger = ledger().await;
        ledger.append("foo", "Page", "1").await.unwrap();
        ledger.append("foo", "Page", "2").await.unwrap();
        ledger.append("bar", "Page", "1").await.unwrap();
        ledger.append("bar", "Page", "3").await.unwrap();

        assert_eq!(ledger.latest_build("foo").await.unwrap(), Some(BuildId(2)));
        assert_eq!(ledger.latest_build("bar").await.unwrap(), Some(BuildId(4)));
    }

    #[tokio::test]
    async fn records_between_is_inclusive_and_scoped() {
        let ledger = ledger().await;
        ledger.append("foo", "Page", "1").await.unwrap();
        ledger.append("bar", "Page", "x").await.unwrap();
        ledger.append("foo", "Page", "2").await.unwrap();
        ledger.append("foo", "Article", "9").await.unwrap();

        let records = ledger
            .records_between("foo", BuildId(1), BuildId(3))
            .await
            .unwrap();
        let ids: Vec<i64> = records.iter().map(|r| r.build_id.value()).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(records[1].entity_id, "2");
    }

    #[tokio::test]
    async fn separate_in_memory_ledgers_are_isolated() {
        let ledger = ledger().await;
        ledger.append("foo", "Page", "1").await.unwrap();

        let other = SurrealBuildLedger::in_memory().await.unwrap();
        assert_eq!(other.latest_build("foo").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_all_succeed_with_unique_ids() {
        let ledger = ledger().await;

        let mut handles = Vec::new();
        for i in 0..64 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                let destination = if i % 2 == 0 { "foo" } else { "bar" };
                ledger.append(destination, "Page", &i.to_string()).await
            }));
        }

        let mut ids = Vec::new();
        for result in futures::future::join_all(handles).await {
            let record = result.unwrap().expect("concurrent append failed");
            ids.push(record.build_id.value());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 64);

        let top = BuildId(*ids.last().unwrap());
        let foo = ledger.records_between("foo", BuildId(1), top).await.unwrap();
        let bar = ledger.records_between("bar", BuildId(1), top).await.unwrap();
        assert_eq!(foo.len() + bar.len(), 64);
    }

    #[tokio::test]
    async fn schema_setup_can_run_twice() {
        let db = surrealdb::engine::any::connect("mem://").await.unwrap();
        db.use_ns("sitebuild").use_db("ledger").await.unwrap();

        build_ledger::migrations::init_schema(&db).await.unwrap();
        build_ledger::migrations::init_schema(&db).await.unwrap();
    }
}
