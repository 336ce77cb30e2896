//! Pure trade math: fees, pro-rata distribution, and valuation. No IO
//! happens here; the orchestration layer feeds these functions and
//! moves the money.

pub mod distribution;
pub mod fees;
pub mod valuation;

pub use distribution::{
    distribute, distribute_vault_share, stakes_from_vault, Distribution, OwnerShare, OwnerStake,
};
pub use fees::{
    compute_fee, lamports_to_sol, leverage_bps, profit_fee_lamports, profit_fee_sol,
    sol_to_lamports_floor, FeeBreakdown, FeeParams, BPS_DENOMINATOR,
};
pub use valuation::{size_open, value_close, CloseValuation, OpenSizing, ValuationError};
