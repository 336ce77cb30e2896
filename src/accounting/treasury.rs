//! Platform fee accumulator. A single ledger record holding a lamport
//! total; credits funnel in from open fees, close fees, and the
//! platform's cut of owner distributions.

use crate::domain::coerce;
use crate::error::EngineError;
use crate::ledger::{paths, CasVerdict, LedgerStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PlatformTreasury {
    store: Arc<dyn LedgerStore>,
}

impl PlatformTreasury {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        PlatformTreasury { store }
    }

    /// Add lamports to the platform total. A zero credit writes nothing.
    /// Returns the total after the credit.
    pub async fn credit_lamports(&self, lamports: u64) -> Result<u64, EngineError> {
        if lamports == 0 {
            return self.total_lamports().await;
        }
        let update = move |current: Option<&Value>| {
            let balance = current.map(coerce::lenient_u64).unwrap_or(0);
            CasVerdict::Commit(json!(balance.saturating_add(lamports)))
        };
        let outcome = self
            .store
            .compare_and_swap(&paths::platform_treasury(), &update)
            .await?;
        let total = outcome.value.as_ref().map(coerce::lenient_u64).unwrap_or(0);
        debug!(credited = lamports, total, "platform treasury credit");
        Ok(total)
    }

    /// Current platform total; zero when the record does not exist yet.
    pub async fn total_lamports(&self) -> Result<u64, EngineError> {
        let raw = self.store.read(&paths::platform_treasury()).await?;
        Ok(raw.as_ref().map(coerce::lenient_u64).unwrap_or(0))
    }
}
