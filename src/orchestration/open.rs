//! The open saga: price, size, reserve vault capital, take the user's
//! collateral and fee, fan the fee out, then write the position and its
//! audit records.
//!
//! Ordering puts the refusable steps first. Once the user is debited
//! the trade goes through; fee fan-out failures degrade to logged gaps
//! on the receipt, and a failed position write unwinds the debit and
//! the borrow before reporting.

use super::{encode, PositionLifecycle};
use crate::domain::{
    Decimal, FeeEvent, FeeRecord, OwnerCredit, Position, PositionId, RecordStatus, TradeKind,
    TradeRecord, UserId, VaultId, SOL_ASSET_ID,
};
use crate::engine::distribution::{distribute_vault_share, Distribution};
use crate::engine::fees::{compute_fee, FeeBreakdown, FeeParams, BPS_DENOMINATOR};
use crate::engine::valuation::size_open;
use crate::error::EngineError;
use crate::ledger::paths;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub user_id: UserId,
    pub vault_id: VaultId,
    /// User capital at risk, in SOL. The open fee is charged on top.
    pub collateral_sol: Decimal,
    /// Total exposure as a multiple of collateral, in basis points.
    /// 10_000 is an unleveraged 1x; 50_000 borrows four times the
    /// collateral from the vault.
    pub leverage_bps: u64,
    /// Entry price override; fetched from the price source when absent.
    pub entry_price_usd: Option<Decimal>,
    /// Settlement-asset price override; fetched when absent.
    pub sol_price_usd: Option<Decimal>,
}

impl OpenRequest {
    pub fn new(
        user_id: UserId,
        vault_id: VaultId,
        collateral_sol: Decimal,
        leverage_bps: u64,
    ) -> Self {
        OpenRequest {
            user_id,
            vault_id,
            collateral_sol,
            leverage_bps,
            entry_price_usd: None,
            sol_price_usd: None,
        }
    }
}

/// What an accepted open actually did.
#[derive(Debug, Clone)]
pub struct OpenReceipt {
    pub position: Position,
    pub fee: FeeBreakdown,
    /// How the fee's vault share split across owners.
    pub distribution: Distribution,
    /// Collateral plus the charged fee, taken from the user's balance.
    pub debited_sol: Decimal,
    /// Post-debit steps that failed and need operator attention.
    pub reconciliation_gaps: Vec<String>,
}

impl PositionLifecycle {
    /// Open a leveraged position against a vault.
    ///
    /// # Errors
    /// Refusals before money moves: validation, leverage and size caps,
    /// missing prices, inactive vault, insufficient vault capital, and
    /// insufficient user balance. [`EngineError::Reconciliation`] means
    /// the saga failed after the debit and compensation was attempted.
    pub async fn open_position(&self, request: OpenRequest) -> Result<OpenReceipt, EngineError> {
        if !request.collateral_sol.is_positive() {
            return Err(EngineError::Validation(format!(
                "collateral must be positive, got {}",
                request.collateral_sol
            )));
        }
        if request.leverage_bps < BPS_DENOMINATOR {
            return Err(EngineError::Validation(format!(
                "leverage {}bps is below 1x",
                request.leverage_bps
            )));
        }
        if request.leverage_bps > self.config.max_leverage_bps {
            return Err(EngineError::Validation(format!(
                "leverage {}bps exceeds the {}bps cap",
                request.leverage_bps, self.config.max_leverage_bps
            )));
        }

        let vault = self.vaults.get_vault(&request.vault_id).await?;
        if !vault.is_active() {
            return Err(EngineError::VaultNotActive {
                vault: vault.id.clone(),
                status: vault.status,
            });
        }

        let token_price = self
            .resolve_price(request.entry_price_usd, vault.token_mint.as_str())
            .await?;
        let sol_price = self
            .resolve_price(request.sol_price_usd, SOL_ASSET_ID)
            .await?;

        let borrow_sol = request.collateral_sol
            * Decimal::from(request.leverage_bps - BPS_DENOMINATOR)
            / Decimal::from(BPS_DENOMINATOR);
        let sizing = size_open(request.collateral_sol, borrow_sol, token_price, sol_price)?;
        if sizing.size_in_underlying > self.config.max_position_units {
            return Err(EngineError::Validation(format!(
                "position size {} exceeds the {} unit cap",
                sizing.size_in_underlying, self.config.max_position_units
            )));
        }

        // The open fee is charged on collateral, not total exposure.
        let fee = compute_fee(&FeeParams {
            notional_usd: request.collateral_sol * sol_price,
            fee_bps: vault.params.open_fee_bps,
            vault_share_pct: vault.params.vault_share_pct,
            sol_price_usd: sol_price,
            min_fee_usd: self.config.min_fee_usd,
            max_fee_usd: self.config.max_fee_usd,
        });
        let charged_sol = fee.charged_sol();
        let debit_total = request.collateral_sol + charged_sol;

        // Carve vault capital before touching the user's balance so the
        // common refusal (insufficient funds) only has the borrow to
        // unwind.
        let vault = if borrow_sol.is_positive() {
            self.vaults
                .reserve_borrow(&request.vault_id, borrow_sol)
                .await?
        } else {
            vault
        };

        if let Err(err) = self.balances.debit(&request.user_id, debit_total).await {
            if borrow_sol.is_positive() {
                if let Err(release_err) = self
                    .vaults
                    .release_borrow(&request.vault_id, borrow_sol)
                    .await
                {
                    return Err(EngineError::Reconciliation(format!(
                        "open debit failed ({}) and the borrow release failed too ({}); \
                         vault {} holds a phantom borrow of {}",
                        err, release_err, request.vault_id, borrow_sol
                    )));
                }
            }
            return Err(err);
        }

        // Point of no return: the user has paid. Fan-out failures are
        // recorded, not fatal.
        let mut gaps = Vec::new();
        let distribution = distribute_vault_share(&vault, fee.vault_share_lamports);
        let credits: Vec<(UserId, u64)> = distribution
            .per_owner
            .iter()
            .map(|share| (share.id.clone(), share.keep))
            .collect();
        if let Err(err) = self.vaults.credit_owner_shares(&request.vault_id, &credits).await {
            warn!(vault = %request.vault_id, error = %err, "owner fee credit failed");
            gaps.push(format!("owner fee credit failed: {}", err));
        }
        let platform_lamports = fee.platform_share_lamports + distribution.platform;
        if let Err(err) = self.treasury.credit_lamports(platform_lamports).await {
            warn!(error = %err, "platform treasury credit failed");
            gaps.push(format!("platform treasury credit failed: {}", err));
        }

        let now = self.clock.now_ms();
        let position = Position::open(
            PositionId::generate(),
            request.user_id.clone(),
            request.vault_id.clone(),
            vault.token_mint.clone(),
            request.collateral_sol,
            borrow_sol,
            sizing.size_in_underlying,
            token_price,
            sol_price,
            self.config.debt_apr_bps,
            now,
        );

        let trade = TradeRecord {
            id: TradeRecord::open_id(&position.id),
            kind: TradeKind::Open,
            user_id: request.user_id.clone(),
            vault_id: request.vault_id.clone(),
            token_mint: vault.token_mint.clone(),
            position_id: Some(position.id.clone()),
            amount_sol: request.collateral_sol,
            borrowed_sol: Some(borrow_sol),
            size_in_underlying: Some(sizing.size_in_underlying),
            price_usd: Some(token_price),
            sol_price_usd: Some(sol_price),
            realized_pnl_sol: None,
            fee_sol: Some(charged_sol),
            liquidated: false,
            status: RecordStatus::Confirmed,
            at: now,
        };
        let fee_record = FeeRecord {
            id: FeeRecord::open_id(&position.id),
            event: FeeEvent::Open,
            vault_id: request.vault_id.clone(),
            position_id: Some(position.id.clone()),
            user_id: request.user_id.clone(),
            fee_sol: charged_sol,
            fee_usd: fee.fee_usd,
            fee_lamports: fee.fee_lamports,
            vault_share_lamports: fee.vault_share_lamports,
            // Everything the platform took for this event, dust included.
            platform_lamports,
            owner_credits: distribution
                .per_owner
                .iter()
                .map(|share| OwnerCredit {
                    user_id: share.id.clone(),
                    lamports: share.keep,
                })
                .collect(),
            status: RecordStatus::Confirmed,
            at: now,
        };

        if let Err(err) = self
            .write_open_records(&position, &trade, &fee_record)
            .await
        {
            return Err(self
                .unwind_failed_open(&request, borrow_sol, debit_total, err)
                .await);
        }

        info!(
            user = %request.user_id,
            vault = %request.vault_id,
            position = %position.id,
            collateral = %request.collateral_sol,
            borrowed = %borrow_sol,
            fee_sol = %charged_sol,
            "position opened"
        );
        Ok(OpenReceipt {
            position,
            fee,
            distribution,
            debited_sol: debit_total,
            reconciliation_gaps: gaps,
        })
    }

    /// Use a caller-supplied price when given, otherwise consult the
    /// price source. A supplied non-positive price is a validation
    /// error rather than a lookup failure.
    pub(super) async fn resolve_price(
        &self,
        supplied: Option<Decimal>,
        asset_id: &str,
    ) -> Result<Decimal, EngineError> {
        match supplied {
            Some(price) if price.is_positive() => Ok(price),
            Some(price) => Err(EngineError::Validation(format!(
                "price for {} must be positive, got {}",
                asset_id, price
            ))),
            None => self.price_of(asset_id).await,
        }
    }

    /// Encode the open's records and land them in one batch. An encode
    /// failure takes the same exit as a failed write.
    async fn write_open_records(
        &self,
        position: &Position,
        trade: &TradeRecord,
        fee_record: &FeeRecord,
    ) -> Result<(), EngineError> {
        let entries = vec![
            (
                paths::position(&position.user_id, &position.id),
                encode(position)?,
            ),
            (paths::trade(&trade.user_id, &trade.id), encode(trade)?),
            (
                paths::fee_record(&fee_record.vault_id, &fee_record.id),
                encode(fee_record)?,
            ),
        ];
        self.store.write_many(entries).await?;
        Ok(())
    }

    /// Unwind a debit and borrow after the position write failed. Fee
    /// credits already fanned out stay put; the error reports them.
    async fn unwind_failed_open(
        &self,
        request: &OpenRequest,
        borrow_sol: Decimal,
        debit_total: Decimal,
        cause: EngineError,
    ) -> EngineError {
        let mut unrecovered = Vec::new();
        if borrow_sol.is_positive() {
            if let Err(err) = self
                .vaults
                .release_borrow(&request.vault_id, borrow_sol)
                .await
            {
                unrecovered.push(format!(
                    "borrow of {} not released from vault {} ({})",
                    borrow_sol, request.vault_id, err
                ));
            }
        }
        if let Err(err) = self.balances.credit(&request.user_id, debit_total).await {
            unrecovered.push(format!(
                "debit of {} not returned to {} ({})",
                debit_total, request.user_id, err
            ));
        }
        if unrecovered.is_empty() {
            EngineError::Reconciliation(format!(
                "position write failed ({}); debit and borrow were unwound but fee credits \
                 already distributed",
                cause
            ))
        } else {
            EngineError::Reconciliation(format!(
                "position write failed ({}) and compensation is incomplete: {}",
                cause,
                unrecovered.join("; ")
            ))
        }
    }
}
