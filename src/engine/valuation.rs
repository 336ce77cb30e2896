//! Position sizing and settlement valuation. Everything here is pure:
//! prices in, figures out.

use crate::domain::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValuationError {
    #[error("price must be positive, got {0}")]
    NonPositivePrice(Decimal),
    #[error("amount must not be negative, got {0}")]
    NegativeAmount(Decimal),
}

/// Figures for a freshly sized open.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenSizing {
    /// Collateral plus borrowed principal, in SOL.
    pub notional_sol: Decimal,
    pub notional_usd: Decimal,
    /// Units of the underlying the notional buys at entry.
    pub size_in_underlying: Decimal,
}

/// Size an open: the full notional converts to USD at the settlement
/// price and buys the underlying at its entry price.
///
/// # Errors
/// Rejects non-positive prices and negative amounts.
pub fn size_open(
    collateral_sol: Decimal,
    borrowed_sol: Decimal,
    token_price_usd: Decimal,
    sol_price_usd: Decimal,
) -> Result<OpenSizing, ValuationError> {
    if !token_price_usd.is_positive() {
        return Err(ValuationError::NonPositivePrice(token_price_usd));
    }
    if !sol_price_usd.is_positive() {
        return Err(ValuationError::NonPositivePrice(sol_price_usd));
    }
    if collateral_sol.is_negative() {
        return Err(ValuationError::NegativeAmount(collateral_sol));
    }
    if borrowed_sol.is_negative() {
        return Err(ValuationError::NegativeAmount(borrowed_sol));
    }

    let notional_sol = collateral_sol + borrowed_sol;
    let notional_usd = notional_sol * sol_price_usd;
    let size_in_underlying = notional_usd / token_price_usd;

    Ok(OpenSizing {
        notional_sol,
        notional_usd,
        size_in_underlying,
    })
}

/// Figures for settling a close.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseValuation {
    pub gross_value_usd: Decimal,
    /// Position value at the close prices, in SOL.
    pub gross_value_sol: Decimal,
    /// `gross_value_sol - entry notional`; negative on a loss.
    pub pnl_sol: Decimal,
}

/// Value a position at close prices and realize its pnl against the
/// entry notional.
///
/// # Errors
/// Rejects non-positive prices.
pub fn value_close(
    size_in_underlying: Decimal,
    entry_notional_sol: Decimal,
    close_price_usd: Decimal,
    sol_price_usd: Decimal,
) -> Result<CloseValuation, ValuationError> {
    if !close_price_usd.is_positive() {
        return Err(ValuationError::NonPositivePrice(close_price_usd));
    }
    if !sol_price_usd.is_positive() {
        return Err(ValuationError::NonPositivePrice(sol_price_usd));
    }

    let gross_value_usd = size_in_underlying * close_price_usd;
    let gross_value_sol = gross_value_usd / sol_price_usd;
    let pnl_sol = gross_value_sol - entry_notional_sol;

    Ok(CloseValuation {
        gross_value_usd,
        gross_value_sol,
        pnl_sol,
    })
}
