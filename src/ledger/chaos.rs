//! Failure-injecting ledger wrapper for exercising retry and
//! compensation paths deterministically.

use super::{CasOutcome, CasUpdate, LedgerError, LedgerStore, CAS_ATTEMPTS};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Wraps any [`LedgerStore`] and fails a budgeted number of operations
/// on paths matching a prefix. Reads always pass through.
#[derive(Debug)]
pub struct ChaosLedger {
    inner: Arc<dyn LedgerStore>,
    cas_contention: Mutex<HashMap<String, u32>>,
    write_failures: Mutex<HashMap<String, u32>>,
}

impl ChaosLedger {
    pub fn new(inner: Arc<dyn LedgerStore>) -> Self {
        ChaosLedger {
            inner,
            cas_contention: Mutex::new(HashMap::new()),
            write_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Make the next `times` compare-and-swaps on paths starting with
    /// `prefix` fail with [`LedgerError::Contention`].
    pub fn contend_cas(&self, prefix: &str, times: u32) {
        lock(&self.cas_contention).insert(prefix.to_string(), times);
    }

    /// Make the next `times` batch writes touching a path starting with
    /// `prefix` fail with a storage error.
    pub fn fail_writes(&self, prefix: &str, times: u32) {
        lock(&self.write_failures).insert(prefix.to_string(), times);
    }

    fn take_budget(budgets: &Mutex<HashMap<String, u32>>, path: &str) -> bool {
        let mut guard = lock(budgets);
        for (prefix, remaining) in guard.iter_mut() {
            if *remaining > 0 && path.starts_with(prefix.as_str()) {
                *remaining -= 1;
                return true;
            }
        }
        false
    }
}

fn lock<'a>(
    budgets: &'a Mutex<HashMap<String, u32>>,
) -> MutexGuard<'a, HashMap<String, u32>> {
    budgets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LedgerStore for ChaosLedger {
    async fn read(&self, path: &str) -> Result<Option<Value>, LedgerError> {
        self.inner.read(path).await
    }

    async fn compare_and_swap(
        &self,
        path: &str,
        update: CasUpdate<'_>,
    ) -> Result<CasOutcome, LedgerError> {
        if Self::take_budget(&self.cas_contention, path) {
            return Err(LedgerError::Contention {
                path: path.to_string(),
                attempts: CAS_ATTEMPTS,
            });
        }
        self.inner.compare_and_swap(path, update).await
    }

    async fn write_many(&self, writes: Vec<(String, Value)>) -> Result<(), LedgerError> {
        if writes
            .iter()
            .any(|(path, _)| Self::take_budget(&self.write_failures, path))
        {
            return Err(LedgerError::Storage(sqlx::Error::Protocol(
                "injected write failure".to_string(),
            )));
        }
        self.inner.write_many(writes).await
    }
}
