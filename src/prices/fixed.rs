//! Table-driven price source for tests and deterministic replays.

use super::{PriceError, PriceSource};
use crate::domain::Decimal;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// A [`PriceSource`] that serves prices from an in-memory table.
/// Prices can be repointed mid-test to simulate market moves.
#[derive(Debug, Default)]
pub struct StaticPriceSource {
    prices: Mutex<HashMap<String, Decimal>>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: seed a price.
    pub fn with_price(self, asset_id: &str, price: Decimal) -> Self {
        self.lock().insert(asset_id.to_string(), price);
        self
    }

    /// Repoint an asset's price.
    pub fn set_price(&self, asset_id: &str, price: Decimal) {
        self.lock().insert(asset_id.to_string(), price);
    }

    /// Drop an asset's quote so lookups return `None`.
    pub fn remove_price(&self, asset_id: &str) {
        self.lock().remove(asset_id);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Decimal>> {
        self.prices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn current_price(&self, asset_id: &str) -> Result<Option<Decimal>, PriceError> {
        Ok(self.lock().get(asset_id).copied())
    }
}
