//! Position lifecycle sagas over the per-record ledger.
//!
//! The store gives atomicity for one record at a time, so every flow
//! here is ordered to fail before money moves where possible, and to
//! compensate (release capital, re-credit balances) when a later step
//! fails. Failures past the point of no return surface either as
//! [`EngineError::Reconciliation`] or as logged gaps on the receipt.

mod admin;
mod close;
mod open;

pub use admin::{ClaimReceipt, CreateVaultRequest, CreateVaultReceipt, DepositReceipt};
pub use close::{CloseReceipt, CloseRequest};
pub use open::{OpenReceipt, OpenRequest};

use crate::accounting::{BalanceTransactor, PlatformTreasury, VaultCapitalManager};
use crate::config::EngineConfig;
use crate::domain::{Clock, Position, PositionId, UserId};
use crate::error::EngineError;
use crate::ledger::{paths, LedgerError, LedgerStore};
use crate::prices::PriceSource;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

fn encode<T: Serialize>(value: &T) -> Result<Value, EngineError> {
    serde_json::to_value(value).map_err(|err| EngineError::Ledger(LedgerError::Serialization(err)))
}

/// Entry point for everything that moves money: vault administration,
/// deposits, fee claims, and the open/close sagas.
#[derive(Debug, Clone)]
pub struct PositionLifecycle {
    store: Arc<dyn LedgerStore>,
    prices: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    balances: BalanceTransactor,
    vaults: VaultCapitalManager,
    treasury: PlatformTreasury,
    config: EngineConfig,
}

impl PositionLifecycle {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        prices: Arc<dyn PriceSource>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let balances = BalanceTransactor::from_config(store.clone(), &config);
        let vaults = VaultCapitalManager::new(store.clone(), clock.clone());
        let treasury = PlatformTreasury::new(store.clone());
        PositionLifecycle {
            store,
            prices,
            clock,
            balances,
            vaults,
            treasury,
            config,
        }
    }

    pub fn balances(&self) -> &BalanceTransactor {
        &self.balances
    }

    pub fn vaults(&self) -> &VaultCapitalManager {
        &self.vaults
    }

    pub fn treasury(&self) -> &PlatformTreasury {
        &self.treasury
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch a user's position or fail with
    /// [`EngineError::PositionNotFound`].
    pub async fn get_position(
        &self,
        user: &UserId,
        position_id: &PositionId,
    ) -> Result<Position, EngineError> {
        let raw = self.store.read(&paths::position(user, position_id)).await?;
        match raw {
            None => Err(EngineError::PositionNotFound(position_id.clone())),
            Some(value) => serde_json::from_value(value).map_err(|_| {
                EngineError::Validation(format!("position record {} is malformed", position_id))
            }),
        }
    }

    /// Spot price for an asset. Absent and non-positive quotes both
    /// count as unavailable.
    async fn price_of(&self, asset_id: &str) -> Result<crate::domain::Decimal, EngineError> {
        match self.prices.current_price(asset_id).await? {
            Some(price) if price.is_positive() => Ok(price),
            _ => Err(EngineError::PriceUnavailable(asset_id.to_string())),
        }
    }
}
