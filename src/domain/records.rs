//! Append-style audit records for trades and fee events.
//!
//! Records are keyed deterministically (`{position_id}:{phase}`) so a
//! retried saga step overwrites its own record instead of duplicating
//! it.

use crate::domain::coerce;
use crate::domain::{Decimal, MintAddress, PositionId, TimeMs, UserId, VaultId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeKind {
    Open,
    Close,
    VaultCreate,
    Deposit,
    FeeClaim,
}

/// Records are written once, after the money has moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Confirmed,
}

impl Default for RecordStatus {
    fn default() -> Self {
        RecordStatus::Confirmed
    }
}

/// One entry in a user's trade feed. Optional fields stay unset for
/// kinds they do not apply to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub kind: TradeKind,
    pub user_id: UserId,
    pub vault_id: VaultId,
    pub token_mint: MintAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_id: Option<PositionId>,
    /// Collateral at open, payout at close, amount for deposits and claims.
    #[serde(with = "coerce::decimal_field", default)]
    pub amount_sol: Decimal,
    #[serde(
        with = "coerce::decimal_opt_field",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub borrowed_sol: Option<Decimal>,
    #[serde(
        with = "coerce::decimal_opt_field",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub size_in_underlying: Option<Decimal>,
    #[serde(
        with = "coerce::decimal_opt_field",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub price_usd: Option<Decimal>,
    #[serde(
        with = "coerce::decimal_opt_field",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sol_price_usd: Option<Decimal>,
    #[serde(
        with = "coerce::decimal_opt_field",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub realized_pnl_sol: Option<Decimal>,
    #[serde(
        with = "coerce::decimal_opt_field",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub fee_sol: Option<Decimal>,
    #[serde(default)]
    pub liquidated: bool,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default)]
    pub at: TimeMs,
}

impl TradeRecord {
    pub fn open_id(position_id: &PositionId) -> String {
        format!("{}:open", position_id)
    }

    pub fn close_id(position_id: &PositionId) -> String {
        format!("{}:close", position_id)
    }

    pub fn vault_create_id(vault_id: &VaultId) -> String {
        format!("{}:create", vault_id)
    }

    /// Deposits and claims can repeat, so their ids carry a nonce.
    pub fn deposit_id(vault_id: &VaultId) -> String {
        format!("{}:deposit:{}", vault_id, uuid::Uuid::new_v4())
    }

    pub fn claim_id(vault_id: &VaultId) -> String {
        format!("{}:claim:{}", vault_id, uuid::Uuid::new_v4())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeEvent {
    Open,
    Close,
}

/// Lamports credited to one vault owner as part of a fee event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerCredit {
    pub user_id: UserId,
    #[serde(with = "coerce::lamports_field", default)]
    pub lamports: u64,
}

/// A vault's record of one fee charge and how it was split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRecord {
    pub id: String,
    pub event: FeeEvent,
    pub vault_id: VaultId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_id: Option<PositionId>,
    /// The user whose trade paid the fee.
    pub user_id: UserId,
    #[serde(with = "coerce::decimal_field", default)]
    pub fee_sol: Decimal,
    /// USD figure the fee was computed from. Events priced directly in
    /// the settlement asset convert best-effort; zero when no price was
    /// known at settlement.
    #[serde(with = "coerce::decimal_field", default)]
    pub fee_usd: Decimal,
    #[serde(with = "coerce::lamports_field", default)]
    pub fee_lamports: u64,
    #[serde(with = "coerce::lamports_field", default)]
    pub vault_share_lamports: u64,
    #[serde(with = "coerce::lamports_field", default)]
    pub platform_lamports: u64,
    #[serde(default)]
    pub owner_credits: Vec<OwnerCredit>,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default)]
    pub at: TimeMs,
}

impl FeeRecord {
    pub fn open_id(position_id: &PositionId) -> String {
        format!("{}:open", position_id)
    }

    pub fn close_id(position_id: &PositionId) -> String {
        format!("{}:close", position_id)
    }
}
