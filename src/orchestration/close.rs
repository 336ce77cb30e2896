//! The close saga: settle a position at a caller-supplied mark-to-market
//! value, return the borrow to the vault, pay the user out, charge
//! profit fees, and mark the position closed.
//!
//! The current value comes from the caller because closes must work
//! even when no live quote is available. Profit fees are charged only
//! on positive pnl; the creator's share accrues on the vault and the
//! platform's share lands in the treasury.

use super::{encode, PositionLifecycle};
use crate::domain::{
    Decimal, FeeEvent, FeeRecord, OwnerCredit, Position, PositionId, RecordStatus, TradeKind,
    TradeRecord, UserId, VaultId, SOL_ASSET_ID,
};
use crate::engine::fees::profit_fee_lamports;
use crate::error::EngineError;
use crate::ledger::{paths, CasVerdict};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CloseRequest {
    pub user_id: UserId,
    pub vault_id: VaultId,
    pub position_id: PositionId,
    /// Current mark-to-market value of the whole position, in SOL.
    pub current_value_sol: Decimal,
    /// Close price recorded on the position; derived from the current
    /// value when absent.
    pub mark_price_usd: Option<Decimal>,
    /// Settlement-asset price for the audit trail; looked up best-effort
    /// when absent.
    pub sol_price_usd: Option<Decimal>,
    pub liquidated: bool,
}

impl CloseRequest {
    pub fn new(
        user_id: UserId,
        vault_id: VaultId,
        position_id: PositionId,
        current_value_sol: Decimal,
    ) -> Self {
        CloseRequest {
            user_id,
            vault_id,
            position_id,
            current_value_sol,
            mark_price_usd: None,
            sol_price_usd: None,
            liquidated: false,
        }
    }
}

/// What a settled close actually did.
#[derive(Debug, Clone)]
pub struct CloseReceipt {
    pub position: Position,
    pub realized_pnl_sol: Decimal,
    /// Credited to the user: current value minus profit fees.
    pub payout_sol: Decimal,
    /// Creator's profit-fee share, accrued on the vault.
    pub creator_fee_lamports: u64,
    /// Platform's profit-fee share, credited to the treasury.
    pub platform_fee_lamports: u64,
    /// Post-payout steps that failed and need operator attention.
    pub reconciliation_gaps: Vec<String>,
}

impl PositionLifecycle {
    /// Close an open position at the supplied mark-to-market value.
    ///
    /// # Errors
    /// Refusals before money moves: unknown or already-closed position,
    /// vault mismatch, negative current value.
    /// [`EngineError::Reconciliation`] means money moved but the
    /// settlement could not be completed coherently.
    pub async fn close_position(&self, request: CloseRequest) -> Result<CloseReceipt, EngineError> {
        let position = self
            .get_position(&request.user_id, &request.position_id)
            .await?;
        if !position.is_open() {
            return Err(EngineError::PositionAlreadyClosed(request.position_id));
        }
        if position.vault_id != request.vault_id {
            return Err(EngineError::Validation(format!(
                "position {} belongs to vault {}, not {}",
                position.id, position.vault_id, request.vault_id
            )));
        }
        if request.current_value_sol.is_negative() {
            return Err(EngineError::Validation(format!(
                "current value must not be negative, got {}",
                request.current_value_sol
            )));
        }
        if let Some(mark) = request.mark_price_usd {
            if !mark.is_positive() {
                return Err(EngineError::Validation(format!(
                    "mark price must be positive, got {}",
                    mark
                )));
            }
        }
        let sol_price = self.audit_sol_price(request.sol_price_usd).await?;
        let vault = self.vaults.get_vault(&position.vault_id).await?;

        let pnl = request.current_value_sol - position.notional_sol();
        let creator_fee_lamports = profit_fee_lamports(pnl, vault.params.close_fee_bps);
        let platform_fee_lamports =
            profit_fee_lamports(pnl, self.config.platform_close_fee_bps);
        // The payout deducts the lamport-exact charge, the same figure
        // the fee credits move.
        let fee_sol = Decimal::from_lamports(creator_fee_lamports + platform_fee_lamports);
        let payout = (request.current_value_sol - fee_sol).max(Decimal::zero());

        // Principal goes home first, profit or not.
        if position.borrowed_sol.is_positive() {
            self.vaults
                .release_borrow(&position.vault_id, position.borrowed_sol)
                .await?;
        }

        if payout.is_positive() {
            if let Err(err) = self.balances.credit(&request.user_id, payout).await {
                return Err(self.unwind_failed_payout(&position, err).await);
            }
        }

        // Settled: the user holds the payout. Fee credits degrade to
        // gaps from here.
        let mut gaps = Vec::new();
        if creator_fee_lamports > 0 {
            let credit = [(vault.creator_id.clone(), creator_fee_lamports)];
            if let Err(err) = self
                .vaults
                .credit_owner_shares(&position.vault_id, &credit)
                .await
            {
                warn!(vault = %position.vault_id, error = %err, "creator close-fee credit failed");
                gaps.push(format!("creator close-fee credit failed: {}", err));
            }
        }
        if platform_fee_lamports > 0 {
            if let Err(err) = self.treasury.credit_lamports(platform_fee_lamports).await {
                warn!(error = %err, "platform close-fee credit failed");
                gaps.push(format!("platform close-fee credit failed: {}", err));
            }
        }

        let close_price = request
            .mark_price_usd
            .or_else(|| implied_close_price(&position, request.current_value_sol, sol_price))
            .unwrap_or(position.last_mark_usd);

        let now = self.clock.now_ms();
        let closed = self
            .mark_position_closed(&request, close_price, pnl, payout, now)
            .await?;

        let trade = TradeRecord {
            id: TradeRecord::close_id(&closed.id),
            kind: TradeKind::Close,
            user_id: request.user_id.clone(),
            vault_id: closed.vault_id.clone(),
            token_mint: closed.token_mint.clone(),
            position_id: Some(closed.id.clone()),
            amount_sol: payout,
            borrowed_sol: Some(closed.borrowed_sol),
            size_in_underlying: Some(closed.size_in_underlying),
            price_usd: Some(close_price),
            sol_price_usd: sol_price,
            realized_pnl_sol: Some(pnl),
            fee_sol: Some(fee_sol),
            liquidated: request.liquidated,
            status: RecordStatus::Confirmed,
            at: now,
        };
        let fee_record = FeeRecord {
            id: FeeRecord::close_id(&closed.id),
            event: FeeEvent::Close,
            vault_id: closed.vault_id.clone(),
            position_id: Some(closed.id.clone()),
            user_id: request.user_id.clone(),
            fee_sol,
            // Best-effort: the close itself settles in SOL.
            fee_usd: sol_price.map_or(Decimal::zero(), |price| fee_sol * price),
            fee_lamports: creator_fee_lamports + platform_fee_lamports,
            vault_share_lamports: creator_fee_lamports,
            platform_lamports: platform_fee_lamports,
            owner_credits: if creator_fee_lamports > 0 {
                vec![OwnerCredit {
                    user_id: vault.creator_id.clone(),
                    lamports: creator_fee_lamports,
                }]
            } else {
                Vec::new()
            },
            status: RecordStatus::Confirmed,
            at: now,
        };
        if let Err(err) = self.write_close_audit(&trade, &fee_record).await {
            warn!(position = %closed.id, error = %err, "close audit write failed");
            gaps.push(format!("close audit write failed: {}", err));
        }

        info!(
            user = %request.user_id,
            vault = %closed.vault_id,
            position = %closed.id,
            pnl = %pnl,
            payout = %payout,
            liquidated = request.liquidated,
            "position closed"
        );
        Ok(CloseReceipt {
            position: closed,
            realized_pnl_sol: pnl,
            payout_sol: payout,
            creator_fee_lamports,
            platform_fee_lamports,
            reconciliation_gaps: gaps,
        })
    }

    /// Re-reserve the released borrow after the payout credit failed.
    /// When the unwind lands cleanly the original error propagates and
    /// the close can simply be retried.
    async fn unwind_failed_payout(&self, position: &Position, cause: EngineError) -> EngineError {
        if !position.borrowed_sol.is_positive() {
            return cause;
        }
        match self
            .vaults
            .restore_borrow(&position.vault_id, position.borrowed_sol)
            .await
        {
            Ok(_) => cause,
            Err(restore_err) => EngineError::Reconciliation(format!(
                "payout credit failed ({}) and re-reserving the borrow failed too ({}); \
                 vault {} shows {} as available that belongs to open position {}",
                cause, restore_err, position.vault_id, position.borrowed_sol, position.id
            )),
        }
    }

    /// Flip the position to CLOSED. Money has already moved, so any
    /// refusal here is a reconciliation problem, not a user error.
    async fn mark_position_closed(
        &self,
        request: &CloseRequest,
        close_price: Decimal,
        pnl: Decimal,
        payout: Decimal,
        now: crate::domain::TimeMs,
    ) -> Result<Position, EngineError> {
        let path = paths::position(&request.user_id, &request.position_id);
        let update = move |current: Option<&Value>| {
            let parsed: Option<Position> =
                current.and_then(|value| serde_json::from_value(value.clone()).ok());
            match parsed {
                Some(mut position) if position.is_open() => {
                    position.mark_closed(close_price, pnl, payout, request.liquidated, now);
                    match serde_json::to_value(&position) {
                        Ok(value) => CasVerdict::Commit(value),
                        Err(_) => CasVerdict::Abort,
                    }
                }
                _ => CasVerdict::Abort,
            }
        };
        let outcome = match self.store.compare_and_swap(&path, &update).await {
            Ok(outcome) => outcome,
            Err(err) => {
                return Err(EngineError::Reconciliation(format!(
                    "position {} was paid out but could not be marked closed: {}",
                    request.position_id, err
                )));
            }
        };
        if !outcome.committed {
            return Err(EngineError::Reconciliation(format!(
                "position {} changed underneath its close; payout and fees may be duplicated",
                request.position_id
            )));
        }
        outcome
            .value
            .and_then(|value| serde_json::from_value(value).ok())
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "position record {} is malformed",
                    request.position_id
                ))
            })
    }

    /// Encode and write the close's audit records in one batch. The
    /// settlement already stands, so the caller turns any failure here
    /// into a gap, never an error.
    async fn write_close_audit(
        &self,
        trade: &TradeRecord,
        fee_record: &FeeRecord,
    ) -> Result<(), EngineError> {
        let entries = vec![
            (paths::trade(&trade.user_id, &trade.id), encode(trade)?),
            (
                paths::fee_record(&fee_record.vault_id, &fee_record.id),
                encode(fee_record)?,
            ),
        ];
        self.store.write_many(entries).await?;
        Ok(())
    }

    /// Settlement-asset price for the audit trail. A supplied price is
    /// validated; a missing one is looked up without failing the close.
    async fn audit_sol_price(
        &self,
        supplied: Option<Decimal>,
    ) -> Result<Option<Decimal>, EngineError> {
        match supplied {
            Some(price) if price.is_positive() => Ok(Some(price)),
            Some(price) => Err(EngineError::Validation(format!(
                "price for {} must be positive, got {}",
                SOL_ASSET_ID, price
            ))),
            None => Ok(self
                .prices
                .current_price(SOL_ASSET_ID)
                .await
                .ok()
                .flatten()),
        }
    }
}

/// Per-unit USD close price implied by the settled value. `None` when
/// no settlement price is known or the position has no size.
fn implied_close_price(
    position: &Position,
    current_value_sol: Decimal,
    sol_price_usd: Option<Decimal>,
) -> Option<Decimal> {
    let sol_price = sol_price_usd?;
    if !position.size_in_underlying.is_positive() {
        return None;
    }
    Some(current_value_sol * sol_price / position.size_in_underlying)
}
