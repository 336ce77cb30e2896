//! Concurrent balance traffic against the in-memory ledger. One record,
//! many tasks; the compare-and-swap loop has to settle every storm to
//! the exact sum.

use levervault::domain::UserId;
use levervault::{BalanceTransactor, Decimal, EngineError, LedgerStore, MemoryLedger};
use std::sync::Arc;
use std::time::Duration;

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn transactor() -> Arc<BalanceTransactor> {
    let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new());
    Arc::new(BalanceTransactor::new(store, 8, Duration::from_millis(1)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_credits_all_land() {
    let balances = transactor();
    let user = UserId::new("user-1");

    let mut handles = Vec::new();
    for _ in 0..16 {
        let balances = balances.clone();
        let user = user.clone();
        handles.push(tokio::spawn(
            async move { balances.credit(&user, d("1")).await },
        ));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(balances.balance_of(&user).await.unwrap(), d("16"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_traffic_conserves_the_total() {
    let balances = transactor();
    let user = UserId::new("user-1");
    balances.credit(&user, d("100")).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let balances = balances.clone();
        let user = user.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                balances.credit(&user, d("2")).await
            } else {
                balances.debit(&user, d("3")).await
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // 100 + 10 * 2 - 10 * 3, regardless of interleaving.
    assert_eq!(balances.balance_of(&user).await.unwrap(), d("90"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overdraw_race_admits_exactly_the_available_funds() {
    let balances = transactor();
    let user = UserId::new("user-1");
    balances.credit(&user, d("5")).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let balances = balances.clone();
        let user = user.clone();
        handles.push(tokio::spawn(
            async move { balances.debit(&user, d("1")).await },
        ));
    }

    let mut committed = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(EngineError::InsufficientFunds { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    // The balance only ever shrinks here, so the split is exact: five
    // debits drain it and the rest observe zero.
    assert_eq!(committed, 5);
    assert_eq!(rejected, 5);
    assert_eq!(balances.balance_of(&user).await.unwrap(), d("0"));
}
