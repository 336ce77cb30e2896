use crate::domain::Decimal;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod fixed;

pub use fixed::StaticPriceSource;

/// Error type for price lookups.
#[derive(Debug, Clone, Error)]
pub enum PriceError {
    #[error("price source unavailable: {0}")]
    Unavailable(String),
}

/// Supplies current USD prices for assets, keyed by asset id (a token
/// mint, or [`crate::domain::SOL_ASSET_ID`] for the settlement asset).
#[async_trait]
pub trait PriceSource: Send + Sync + fmt::Debug {
    /// Current USD price for the asset, or `None` if the source has no
    /// quote for it.
    async fn current_price(&self, asset_id: &str) -> Result<Option<Decimal>, PriceError>;
}
