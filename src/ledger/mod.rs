//! Ledger storage abstraction: a path-keyed document store whose only
//! concurrency primitive is per-record compare-and-swap.
//!
//! There are no cross-record transactions at the trait level. Anything
//! that must stay consistent across records is the orchestration
//! layer's problem (see `orchestration`), which compensates rather than
//! assuming atomicity.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub mod chaos;
pub mod memory;
pub mod paths;
pub mod sqlite;

pub use chaos::ChaosLedger;
pub use memory::MemoryLedger;
pub use sqlite::{init_ledger_db, SqliteLedger};

/// How many times a compare-and-swap re-reads and re-applies its update
/// closure after losing a version race before giving up.
pub const CAS_ATTEMPTS: u32 = 25;

/// What an update closure decides after seeing the current value at a
/// path (`None` when the record does not exist).
#[derive(Debug, Clone)]
pub enum CasVerdict {
    /// Replace the record with this value, guarded by the version the
    /// closure's input was read at.
    Commit(Value),
    /// Leave the record untouched.
    Abort,
}

/// Result of a compare-and-swap that ran to completion (committed or
/// cleanly aborted). Version-race exhaustion is an error, not an
/// outcome.
#[derive(Debug, Clone)]
pub struct CasOutcome {
    pub committed: bool,
    /// On commit, the value written. On abort, the value the closure
    /// last observed, so callers can explain the refusal.
    pub value: Option<Value>,
}

/// Update closure handed to [`LedgerStore::compare_and_swap`]. Invoked
/// once per attempt with a fresh read of the record.
pub type CasUpdate<'a> = &'a (dyn Fn(Option<&Value>) -> CasVerdict + Send + Sync);

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("contention on {path}: gave up after {attempts} attempts")]
    Contention { path: String, attempts: u32 },
}

/// A path-keyed JSON document store with per-record optimistic
/// concurrency.
#[async_trait]
pub trait LedgerStore: Send + Sync + fmt::Debug {
    /// Read the value at a path, or `None` if no record exists.
    async fn read(&self, path: &str) -> Result<Option<Value>, LedgerError>;

    /// Atomically update one record. The closure sees the current value
    /// and either commits a replacement or aborts; on a version race
    /// the store re-reads and re-invokes the closure, up to
    /// [`CAS_ATTEMPTS`] times.
    ///
    /// # Errors
    /// Returns [`LedgerError::Contention`] when the record keeps moving
    /// under the closure, or a storage error from the backend.
    async fn compare_and_swap(
        &self,
        path: &str,
        update: CasUpdate<'_>,
    ) -> Result<CasOutcome, LedgerError>;

    /// Write several records, bumping each record's version. Per-record
    /// visibility only: callers must not lean on atomicity across
    /// paths.
    async fn write_many(&self, writes: Vec<(String, Value)>) -> Result<(), LedgerError>;
}
