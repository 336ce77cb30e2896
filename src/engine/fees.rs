//! Fee math: basis-point fees with a floor/cap, split between vault
//! owners and the platform, converted to settlement-asset lamports.
//!
//! The lamport figures are what actually moves. The total charge rounds
//! up, the vault's integer share rounds down, and the platform share is
//! the difference, so the three always reconcile exactly.

use crate::domain::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

/// Basis points in one whole.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Inputs to a fee computation.
#[derive(Debug, Clone)]
pub struct FeeParams {
    /// USD notional the fee applies to.
    pub notional_usd: Decimal,
    pub fee_bps: u32,
    /// Fraction of the fee routed to vault owners, in `[0, 1]`.
    pub vault_share_pct: Decimal,
    /// Current USD price of the settlement asset.
    pub sol_price_usd: Decimal,
    pub min_fee_usd: Decimal,
    pub max_fee_usd: Option<Decimal>,
}

/// A fully worked fee: USD figures, the SOL equivalent, and the exact
/// lamport amounts that move.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeBreakdown {
    pub notional_usd: Decimal,
    pub fee_bps: u32,
    /// Fee in USD after the floor and cap.
    pub fee_usd: Decimal,
    pub vault_share_usd: Decimal,
    pub platform_share_usd: Decimal,
    /// Fee in SOL before lamport rounding.
    pub fee_sol: Decimal,
    /// Total charge, rounded up to whole lamports.
    pub fee_lamports: u64,
    /// Vault owners' cut, rounded down.
    pub vault_share_lamports: u64,
    /// `fee_lamports - vault_share_lamports`.
    pub platform_share_lamports: u64,
    pub sol_price_usd: Decimal,
}

impl FeeBreakdown {
    /// The amount actually charged, in SOL (lamport-exact).
    pub fn charged_sol(&self) -> Decimal {
        Decimal::from_lamports(self.fee_lamports)
    }
}

/// Compute a basis-point fee on a USD notional and split it.
///
/// The raw fee is `notional * bps / 10_000`, floored at `min_fee_usd`
/// and capped at `max_fee_usd` when set. The vault share comes from
/// multiplication and the platform share from subtraction, so the two
/// USD figures sum to the fee exactly; the lamport figures do the same
/// in integers.
///
/// A non-positive notional or a zero `fee_bps` charges nothing; the
/// floor does not apply when no fee is due. Without a positive
/// settlement price the USD figures still come back populated but every
/// SOL and lamport figure is zero, so callers settling in the asset
/// must resolve a price first.
pub fn compute_fee(params: &FeeParams) -> FeeBreakdown {
    let fee_usd = if !params.notional_usd.is_positive() || params.fee_bps == 0 {
        Decimal::zero()
    } else {
        let raw_fee_usd = params.notional_usd * Decimal::from(params.fee_bps as u64)
            / Decimal::from(BPS_DENOMINATOR);
        let mut clamped = raw_fee_usd.max(params.min_fee_usd);
        if let Some(cap) = params.max_fee_usd {
            clamped = clamped.min(cap);
        }
        clamped
    };

    let share_pct = params
        .vault_share_pct
        .max(Decimal::zero())
        .min(Decimal::one());
    let vault_share_usd = fee_usd * share_pct;
    let platform_share_usd = fee_usd - vault_share_usd;

    let (fee_sol, fee_lamports, vault_share_lamports) = if params.sol_price_usd.is_positive() {
        let fee_sol = fee_usd / params.sol_price_usd;
        let fee_lamports = fee_sol.to_lamports_ceil();
        let vault_share_lamports = (vault_share_usd / params.sol_price_usd).to_lamports_floor();
        (fee_sol, fee_lamports, vault_share_lamports)
    } else {
        (Decimal::zero(), 0, 0)
    };
    let platform_share_lamports = fee_lamports - vault_share_lamports;

    FeeBreakdown {
        notional_usd: params.notional_usd,
        fee_bps: params.fee_bps,
        fee_usd,
        vault_share_usd,
        platform_share_usd,
        fee_sol,
        fee_lamports,
        vault_share_lamports,
        platform_share_lamports,
        sol_price_usd: params.sol_price_usd,
    }
}

/// Basis-point fee on realized profit, in SOL. Zero when the profit is
/// not positive; losses are never charged.
pub fn profit_fee_sol(pnl_sol: Decimal, fee_bps: u32) -> Decimal {
    if !pnl_sol.is_positive() || fee_bps == 0 {
        return Decimal::zero();
    }
    pnl_sol * Decimal::from(fee_bps as u64) / Decimal::from(BPS_DENOMINATOR)
}

/// Lamport-exact profit fee: the SOL figure rounded up to whole
/// lamports, matching how the charge is debited.
pub fn profit_fee_lamports(pnl_sol: Decimal, fee_bps: u32) -> u64 {
    profit_fee_sol(pnl_sol, fee_bps).to_lamports_ceil()
}

/// Convert a lamport count to SOL without loss.
pub fn lamports_to_sol(lamports: u64) -> Decimal {
    Decimal::from_lamports(lamports)
}

/// Whole-lamport equivalent of a SOL amount, rounded down. Used for
/// stake weights, so sub-lamport dust never inflates a share.
pub fn sol_to_lamports_floor(sol: Decimal) -> u64 {
    sol.to_lamports_floor()
}

/// Leverage expressed in basis points, e.g. 5x = 50_000.
pub fn leverage_bps(collateral_sol: Decimal, borrowed_sol: Decimal) -> u64 {
    if !collateral_sol.is_positive() {
        return 0;
    }
    let ratio = (collateral_sol + borrowed_sol) / collateral_sol;
    (ratio * Decimal::from(BPS_DENOMINATOR))
        .floor()
        .inner()
        .to_u64()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn params(notional: &str, bps: u32, share: &str, sol_price: &str) -> FeeParams {
        FeeParams {
            notional_usd: d(notional),
            fee_bps: bps,
            vault_share_pct: d(share),
            sol_price_usd: d(sol_price),
            min_fee_usd: d("0.01"),
            max_fee_usd: None,
        }
    }

    #[test]
    fn test_min_fee_floor_applies() {
        // 0.5 USD at 10 bps is 0.0005, under the 0.01 floor.
        let breakdown = compute_fee(&params("0.5", 10, "0.7", "150"));
        assert_eq!(breakdown.fee_usd, d("0.01"));
        assert_eq!(breakdown.vault_share_usd, d("0.007"));
        assert_eq!(breakdown.platform_share_usd, d("0.003"));
    }

    #[test]
    fn test_fee_above_floor_is_proportional() {
        let breakdown = compute_fee(&params("7500", 1000, "0.7", "150"));
        assert_eq!(breakdown.fee_usd, d("750"));
        assert_eq!(breakdown.vault_share_usd, d("525"));
        assert_eq!(breakdown.platform_share_usd, d("225"));
        // 750 USD at 150 USD/SOL is exactly 5 SOL.
        assert_eq!(breakdown.fee_sol, d("5"));
        assert_eq!(breakdown.fee_lamports, 5_000_000_000);
        assert_eq!(breakdown.vault_share_lamports, 3_500_000_000);
        assert_eq!(breakdown.platform_share_lamports, 1_500_000_000);
        assert_eq!(breakdown.charged_sol(), d("5"));
    }

    #[test]
    fn test_max_fee_cap_applies() {
        let mut p = params("1000000", 1000, "0.7", "150");
        p.max_fee_usd = Some(d("500"));
        let breakdown = compute_fee(&p);
        assert_eq!(breakdown.fee_usd, d("500"));
    }

    #[test]
    fn test_lamport_shares_always_reconcile() {
        // An awkward price so neither conversion lands on whole lamports.
        let breakdown = compute_fee(&params("123.45", 37, "0.66", "147.13"));
        assert_eq!(
            breakdown.vault_share_lamports + breakdown.platform_share_lamports,
            breakdown.fee_lamports
        );
        // The rounded-up charge covers the precise SOL fee.
        assert!(Decimal::from_lamports(breakdown.fee_lamports) >= breakdown.fee_sol);
    }

    #[test]
    fn test_zero_notional_or_bps_charges_nothing() {
        // The floor never pulls a no-fee case up to the minimum.
        let zero_notional = compute_fee(&params("0", 100, "0.7", "150"));
        assert_eq!(zero_notional.fee_usd, Decimal::zero());
        assert_eq!(zero_notional.fee_lamports, 0);

        let negative_notional = compute_fee(&params("-25", 100, "0.7", "150"));
        assert_eq!(negative_notional.fee_usd, Decimal::zero());
        assert_eq!(negative_notional.fee_lamports, 0);

        let zero_bps = compute_fee(&params("1000", 0, "0.7", "150"));
        assert_eq!(zero_bps.fee_usd, Decimal::zero());
        assert_eq!(zero_bps.vault_share_usd, Decimal::zero());
        assert_eq!(zero_bps.fee_lamports, 0);
        assert_eq!(zero_bps.platform_share_lamports, 0);
    }

    #[test]
    fn test_missing_price_zeroes_the_asset_figures() {
        let breakdown = compute_fee(&params("7500", 1000, "0.7", "0"));
        assert_eq!(breakdown.fee_usd, d("750"));
        assert_eq!(breakdown.vault_share_usd, d("525"));
        assert_eq!(breakdown.platform_share_usd, d("225"));
        assert_eq!(breakdown.fee_sol, Decimal::zero());
        assert_eq!(breakdown.fee_lamports, 0);
        assert_eq!(breakdown.vault_share_lamports, 0);
        assert_eq!(breakdown.platform_share_lamports, 0);
    }

    #[test]
    fn test_vault_share_clamps_to_unit_range() {
        let breakdown = compute_fee(&params("7500", 1000, "1.5", "150"));
        assert_eq!(breakdown.vault_share_usd, d("750"));
        assert_eq!(breakdown.platform_share_usd, d("0"));
    }

    #[test]
    fn test_profit_fee_only_charges_gains() {
        assert_eq!(profit_fee_sol(d("10"), 1000), d("1"));
        assert_eq!(profit_fee_sol(d("10"), 500), d("0.5"));
        assert_eq!(profit_fee_sol(d("-10"), 1000), Decimal::zero());
        assert_eq!(profit_fee_sol(Decimal::zero(), 1000), Decimal::zero());
        assert_eq!(profit_fee_sol(d("10"), 0), Decimal::zero());
    }

    #[test]
    fn test_profit_fee_lamports_rounds_up() {
        // 1/3 SOL fee has no exact lamport representation.
        assert_eq!(profit_fee_lamports(d("3.3333333335"), 1000), 333_333_334);
        assert_eq!(profit_fee_lamports(d("10"), 1000), 1_000_000_000);
    }

    #[test]
    fn test_leverage_bps() {
        assert_eq!(leverage_bps(d("10"), d("40")), 50_000);
        assert_eq!(leverage_bps(d("10"), d("0")), 10_000);
        assert_eq!(leverage_bps(d("0"), d("40")), 0);
    }
}
