//! Position records for leveraged longs against a vault.

use crate::domain::coerce;
use crate::domain::{Decimal, MintAddress, PositionId, TimeMs, UserId, VaultId};
use serde::{Deserialize, Serialize};

/// Direction of a position. Only longs exist today; the borrow model
/// lends settlement capital, which cannot express a short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
}

impl Default for PositionSide {
    fn default() -> Self {
        PositionSide::Long
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl Default for PositionStatus {
    fn default() -> Self {
        PositionStatus::Open
    }
}

/// A leveraged long: user collateral plus vault principal, swapped into
/// the underlying at entry. Close-time fields stay unset until the
/// position settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub user_id: UserId,
    pub vault_id: VaultId,
    pub token_mint: MintAddress,
    #[serde(default)]
    pub side: PositionSide,
    #[serde(with = "coerce::decimal_field", default)]
    pub collateral_sol: Decimal,
    #[serde(with = "coerce::decimal_field", default)]
    pub borrowed_sol: Decimal,
    /// Units of the underlying bought at entry.
    #[serde(with = "coerce::decimal_field", default)]
    pub size_in_underlying: Decimal,
    #[serde(with = "coerce::decimal_field", default)]
    pub entry_price_usd: Decimal,
    /// Settlement asset price at entry, kept for audit.
    #[serde(with = "coerce::decimal_field", default)]
    pub entry_sol_price_usd: Decimal,
    /// Borrow rate recorded at open. Interest accrual is not charged
    /// yet; the figure rides along for when it is.
    #[serde(default)]
    pub debt_apr_bps: u32,
    #[serde(default)]
    pub status: PositionStatus,
    /// Most recent underlying mark, refreshed at open and close.
    #[serde(with = "coerce::decimal_field", default)]
    pub last_mark_usd: Decimal,
    #[serde(default)]
    pub opened_at: TimeMs,
    #[serde(
        with = "coerce::decimal_opt_field",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub close_price_usd: Option<Decimal>,
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
    pub payout_sol: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<TimeMs>,
    #[serde(default)]
    pub liquidated: bool,
}

impl Position {
    /// Build a freshly opened position.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: PositionId,
        user_id: UserId,
        vault_id: VaultId,
        token_mint: MintAddress,
        collateral_sol: Decimal,
        borrowed_sol: Decimal,
        size_in_underlying: Decimal,
        entry_price_usd: Decimal,
        entry_sol_price_usd: Decimal,
        debt_apr_bps: u32,
        at: TimeMs,
    ) -> Self {
        Position {
            id,
            user_id,
            vault_id,
            token_mint,
            side: PositionSide::Long,
            collateral_sol,
            borrowed_sol,
            size_in_underlying,
            entry_price_usd,
            entry_sol_price_usd,
            debt_apr_bps,
            status: PositionStatus::Open,
            last_mark_usd: entry_price_usd,
            opened_at: at,
            close_price_usd: None,
            realized_pnl_sol: None,
            payout_sol: None,
            closed_at: None,
            liquidated: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Total exposure at entry: collateral plus borrowed principal.
    pub fn notional_sol(&self) -> Decimal {
        self.collateral_sol + self.borrowed_sol
    }

    /// Effective leverage multiple, e.g. 5x for 10 collateral + 40 borrowed.
    pub fn leverage(&self) -> Decimal {
        if self.collateral_sol.is_zero() {
            return Decimal::zero();
        }
        self.notional_sol() / self.collateral_sol
    }

    /// Transition to closed, recording settlement figures.
    pub fn mark_closed(
        &mut self,
        close_price_usd: Decimal,
        realized_pnl_sol: Decimal,
        payout_sol: Decimal,
        liquidated: bool,
        at: TimeMs,
    ) {
        self.status = PositionStatus::Closed;
        self.last_mark_usd = close_price_usd;
        self.close_price_usd = Some(close_price_usd);
        self.realized_pnl_sol = Some(realized_pnl_sol);
        self.payout_sol = Some(payout_sol);
        self.closed_at = Some(at);
        self.liquidated = liquidated;
    }
}
