//! In-memory ledger used by unit tests and as the reference semantics
//! for the persistent backend.

use super::{CasOutcome, CasUpdate, CasVerdict, LedgerError, LedgerStore, CAS_ATTEMPTS};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct VersionedValue {
    value: Value,
    version: u64,
}

/// HashMap-backed [`LedgerStore`] with the same per-record versioning
/// the SQLite backend enforces.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<HashMap<String, VersionedValue>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VersionedValue>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current version of a record, for diagnostics and tests.
    pub fn version(&self, path: &str) -> Option<u64> {
        self.lock().get(path).map(|record| record.version)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn read(&self, path: &str) -> Result<Option<Value>, LedgerError> {
        Ok(self.lock().get(path).map(|record| record.value.clone()))
    }

    async fn compare_and_swap(
        &self,
        path: &str,
        update: CasUpdate<'_>,
    ) -> Result<CasOutcome, LedgerError> {
        for attempt in 1..=CAS_ATTEMPTS {
            let snapshot = {
                let guard = self.lock();
                guard
                    .get(path)
                    .map(|record| (record.value.clone(), record.version))
            };

            // The closure runs outside the lock so a slow update cannot
            // block readers; the version check below catches interleaved
            // writers.
            match update(snapshot.as_ref().map(|(value, _)| value)) {
                CasVerdict::Abort => {
                    return Ok(CasOutcome {
                        committed: false,
                        value: snapshot.map(|(value, _)| value),
                    });
                }
                CasVerdict::Commit(next) => {
                    // Scoped so the guard is dropped before the await below;
                    // an explicit drop() does not satisfy the Send analysis.
                    {
                        let mut guard = self.lock();
                        let read_version = snapshot.as_ref().map(|(_, version)| *version);
                        let current_version = guard.get(path).map(|record| record.version);
                        if current_version == read_version {
                            let version = read_version.map_or(1, |v| v + 1);
                            guard.insert(
                                path.to_string(),
                                VersionedValue {
                                    value: next.clone(),
                                    version,
                                },
                            );
                            return Ok(CasOutcome {
                                committed: true,
                                value: Some(next),
                            });
                        }
                    }
                    debug!(path, attempt, "ledger cas lost version race, retrying");
                    tokio::task::yield_now().await;
                }
            }
        }

        warn!(path, attempts = CAS_ATTEMPTS, "ledger cas exhausted retries");
        Err(LedgerError::Contention {
            path: path.to_string(),
            attempts: CAS_ATTEMPTS,
        })
    }

    async fn write_many(&self, writes: Vec<(String, Value)>) -> Result<(), LedgerError> {
        let mut guard = self.lock();
        for (path, value) in writes {
            match guard.get_mut(&path) {
                Some(record) => {
                    record.value = value;
                    record.version += 1;
                }
                None => {
                    guard.insert(path, VersionedValue { value, version: 1 });
                }
            }
        }
        Ok(())
    }
}
