//! User balance updates over the ledger's per-record CAS.
//!
//! The store already retries version races internally; this layer adds
//! linear backoff across whole CAS rounds when a record is hot enough
//! to exhaust them. A refusal (balance would go negative) is final and
//! never retried.

use crate::config::EngineConfig;
use crate::domain::coerce::lenient_decimal;
use crate::domain::{Decimal, UserId};
use crate::error::EngineError;
use crate::ledger::{paths, CasVerdict, LedgerError, LedgerStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of a balance adjustment that reached a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum BalanceUpdate {
    Committed { new_balance: Decimal },
    /// The delta would have driven the balance negative; nothing was
    /// written. Carries the balance the refusal was based on.
    Rejected { balance: Decimal },
}

/// Applies deltas to `balances/{user}` records.
#[derive(Debug, Clone)]
pub struct BalanceTransactor {
    store: Arc<dyn LedgerStore>,
    retry_limit: u32,
    retry_base: Duration,
}

impl BalanceTransactor {
    pub fn new(store: Arc<dyn LedgerStore>, retry_limit: u32, retry_base: Duration) -> Self {
        BalanceTransactor {
            store,
            retry_limit: retry_limit.max(1),
            retry_base,
        }
    }

    pub fn from_config(store: Arc<dyn LedgerStore>, config: &EngineConfig) -> Self {
        Self::new(
            store,
            config.balance_retry_limit,
            Duration::from_millis(config.balance_retry_base_ms),
        )
    }

    /// Current balance, treating a missing record as zero.
    pub async fn balance_of(&self, user: &UserId) -> Result<Decimal, EngineError> {
        let value = self.store.read(&paths::balance(user)).await?;
        Ok(value.as_ref().map(lenient_decimal).unwrap_or_default())
    }

    /// Apply a signed delta. The result may not go negative: a debit
    /// that would is rejected without retrying. A balance already
    /// negative from legacy data can always be improved by a credit.
    pub async fn adjust(
        &self,
        user: &UserId,
        delta: Decimal,
    ) -> Result<BalanceUpdate, EngineError> {
        let path = paths::balance(user);
        let update = move |current: Option<&Value>| {
            let balance = current.map(lenient_decimal).unwrap_or_default();
            let candidate = balance + delta;
            if delta.is_negative() && candidate.is_negative() {
                CasVerdict::Abort
            } else {
                CasVerdict::Commit(Value::String(candidate.to_canonical_string()))
            }
        };

        for attempt in 1..=self.retry_limit {
            match self.store.compare_and_swap(&path, &update).await {
                Ok(outcome) if outcome.committed => {
                    let new_balance = outcome
                        .value
                        .as_ref()
                        .map(lenient_decimal)
                        .unwrap_or_default();
                    debug!(user = %user, %delta, %new_balance, "balance committed");
                    return Ok(BalanceUpdate::Committed { new_balance });
                }
                Ok(outcome) => {
                    let balance = outcome
                        .value
                        .as_ref()
                        .map(lenient_decimal)
                        .unwrap_or_default();
                    return Ok(BalanceUpdate::Rejected { balance });
                }
                Err(LedgerError::Contention { .. }) => {
                    warn!(
                        user = %user,
                        attempt,
                        limit = self.retry_limit,
                        "balance update contended, backing off"
                    );
                    if attempt < self.retry_limit {
                        tokio::time::sleep(self.retry_base * attempt).await;
                    }
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(EngineError::Contention {
            path,
            attempts: self.retry_limit,
        })
    }

    /// Credit an amount. Never rejected for a non-negative amount.
    ///
    /// # Errors
    /// Fails on a negative amount, persistent contention, or a storage
    /// error.
    pub async fn credit(&self, user: &UserId, amount: Decimal) -> Result<Decimal, EngineError> {
        if amount.is_negative() {
            return Err(EngineError::Validation(format!(
                "credit amount must not be negative, got {}",
                amount
            )));
        }
        match self.adjust(user, amount).await? {
            BalanceUpdate::Committed { new_balance } => Ok(new_balance),
            // Unreachable for a non-negative delta; keep the refusal
            // visible rather than silently dropping it.
            BalanceUpdate::Rejected { balance } => Err(EngineError::Validation(format!(
                "credit of {} to {} refused at balance {}",
                amount, user, balance
            ))),
        }
    }

    /// Debit an amount, refusing rather than overdrawing.
    ///
    /// # Errors
    /// Returns [`EngineError::InsufficientFunds`] when the balance
    /// cannot cover the amount.
    pub async fn debit(&self, user: &UserId, amount: Decimal) -> Result<Decimal, EngineError> {
        if amount.is_negative() {
            return Err(EngineError::Validation(format!(
                "debit amount must not be negative, got {}",
                amount
            )));
        }
        match self.adjust(user, -amount).await? {
            BalanceUpdate::Committed { new_balance } => Ok(new_balance),
            BalanceUpdate::Rejected { balance } => Err(EngineError::InsufficientFunds {
                user: user.clone(),
                needed: amount,
                available: balance,
            }),
        }
    }
}
