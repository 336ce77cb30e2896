//! The sqlite backend through the [`LedgerStore`] trait: create and
//! replace via compare-and-swap, aborts, batch writes, durability
//! across reconnects, and racing writers on one record.

use levervault::ledger::CasVerdict;
use levervault::{LedgerStore, SqliteLedger};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

async fn connect(dir: &TempDir) -> SqliteLedger {
    let path = dir.path().join("ledger.db");
    SqliteLedger::connect(path.to_str().unwrap()).await.unwrap()
}

#[tokio::test]
async fn test_cas_creates_then_replaces() {
    let dir = TempDir::new().unwrap();
    let ledger = connect(&dir).await;

    let outcome = ledger
        .compare_and_swap("balances/u", &|current| {
            assert!(current.is_none());
            CasVerdict::Commit(json!("10"))
        })
        .await
        .unwrap();
    assert!(outcome.committed);
    assert_eq!(outcome.value, Some(json!("10")));
    assert_eq!(ledger.read("balances/u").await.unwrap(), Some(json!("10")));

    let outcome = ledger
        .compare_and_swap("balances/u", &|current| {
            assert_eq!(current, Some(&json!("10")));
            CasVerdict::Commit(json!("25.5"))
        })
        .await
        .unwrap();
    assert!(outcome.committed);
    assert_eq!(
        ledger.read("balances/u").await.unwrap(),
        Some(json!("25.5"))
    );
}

#[tokio::test]
async fn test_cas_abort_leaves_the_record_alone() {
    let dir = TempDir::new().unwrap();
    let ledger = connect(&dir).await;
    ledger
        .compare_and_swap("vaults/v", &|_| CasVerdict::Commit(json!({"tvl": "100"})))
        .await
        .unwrap();

    let outcome = ledger
        .compare_and_swap("vaults/v", &|_| CasVerdict::Abort)
        .await
        .unwrap();
    assert!(!outcome.committed);
    // The refused caller still gets the value it was refused against.
    assert_eq!(outcome.value, Some(json!({"tvl": "100"})));
    assert_eq!(
        ledger.read("vaults/v").await.unwrap(),
        Some(json!({"tvl": "100"}))
    );
}

#[tokio::test]
async fn test_write_many_upserts_every_path() {
    let dir = TempDir::new().unwrap();
    let ledger = connect(&dir).await;

    ledger
        .write_many(vec![
            ("trades/u/t1".to_string(), json!({"kind": "open"})),
            ("fees/v/t1".to_string(), json!({"lamports": 1})),
        ])
        .await
        .unwrap();
    assert_eq!(
        ledger.read("trades/u/t1").await.unwrap(),
        Some(json!({"kind": "open"}))
    );
    assert_eq!(
        ledger.read("fees/v/t1").await.unwrap(),
        Some(json!({"lamports": 1}))
    );

    // Writing the same path again replaces, not duplicates.
    ledger
        .write_many(vec![("fees/v/t1".to_string(), json!({"lamports": 2}))])
        .await
        .unwrap();
    assert_eq!(
        ledger.read("fees/v/t1").await.unwrap(),
        Some(json!({"lamports": 2}))
    );
}

#[tokio::test]
async fn test_records_survive_a_reconnect() {
    let dir = TempDir::new().unwrap();
    let ledger = connect(&dir).await;
    ledger
        .compare_and_swap("balances/u", &|_| CasVerdict::Commit(json!("42.5")))
        .await
        .unwrap();
    ledger
        .write_many(vec![(
            "positions/u/p1".to_string(),
            json!({"status": "open"}),
        )])
        .await
        .unwrap();
    drop(ledger);

    let ledger = connect(&dir).await;
    assert_eq!(
        ledger.read("balances/u").await.unwrap(),
        Some(json!("42.5"))
    );
    assert_eq!(
        ledger.read("positions/u/p1").await.unwrap(),
        Some(json!({"status": "open"}))
    );
    assert_eq!(ledger.read("balances/ghost").await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_writers_settle_to_the_exact_count() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(connect(&dir).await);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .compare_and_swap("counters/settles", &|current: Option<&Value>| {
                    let n = current.and_then(Value::as_i64).unwrap_or(0);
                    CasVerdict::Commit(json!(n + 1))
                })
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().committed);
    }

    assert_eq!(
        ledger.read("counters/settles").await.unwrap(),
        Some(json!(8))
    );
}
