//! Vault administration sagas: creation, deposits, fee claims, and
//! status changes. Same compensation discipline as the trade sagas:
//! the user's balance moves first, and a vault-side refusal puts the
//! money back before the error surfaces.

use super::{encode, PositionLifecycle};
use crate::domain::{
    Decimal, MintAddress, RecordStatus, TradeKind, TradeRecord, UserId, Vault, VaultId,
    VaultParams, VaultStatus,
};
use crate::engine::fees::lamports_to_sol;
use crate::error::EngineError;
use crate::ledger::paths;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CreateVaultRequest {
    pub creator_id: UserId,
    pub token_mint: MintAddress,
    /// Seed capital, debited from the creator. Zero is allowed; the
    /// vault then starts with no lendable capital.
    pub initial_deposit_sol: Decimal,
    /// Fee parameters; engine defaults apply when absent.
    pub params: Option<VaultParams>,
}

#[derive(Debug, Clone)]
pub struct CreateVaultReceipt {
    pub vault: Vault,
    pub debited_sol: Decimal,
    pub reconciliation_gaps: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DepositReceipt {
    pub vault: Vault,
    pub debited_sol: Decimal,
    pub reconciliation_gaps: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClaimReceipt {
    pub vault: Vault,
    pub claimed_sol: Decimal,
    pub claimed_lamports: u64,
    pub reconciliation_gaps: Vec<String>,
}

impl PositionLifecycle {
    /// Create a vault for a token mint, seeded from the creator's
    /// balance. One vault per mint.
    pub async fn create_vault(
        &self,
        request: CreateVaultRequest,
    ) -> Result<CreateVaultReceipt, EngineError> {
        if request.initial_deposit_sol.is_negative() {
            return Err(EngineError::Validation(format!(
                "initial deposit must not be negative, got {}",
                request.initial_deposit_sol
            )));
        }
        let params = request
            .params
            .clone()
            .unwrap_or_else(|| self.config.vault_params());
        validate_params(&params)?;

        let deposit = request.initial_deposit_sol;
        if deposit.is_positive() {
            self.balances.debit(&request.creator_id, deposit).await?;
        }

        let vault = match self
            .vaults
            .create_vault(&request.creator_id, &request.token_mint, deposit, params)
            .await
        {
            Ok(vault) => vault,
            Err(err) => {
                return Err(self
                    .refund_debit(&request.creator_id, deposit, err)
                    .await);
            }
        };

        let mut gaps = Vec::new();
        let record = TradeRecord {
            id: TradeRecord::vault_create_id(&vault.id),
            kind: TradeKind::VaultCreate,
            user_id: request.creator_id.clone(),
            vault_id: vault.id.clone(),
            token_mint: vault.token_mint.clone(),
            position_id: None,
            amount_sol: deposit,
            borrowed_sol: None,
            size_in_underlying: None,
            price_usd: None,
            sol_price_usd: None,
            realized_pnl_sol: None,
            fee_sol: None,
            liquidated: false,
            status: RecordStatus::Confirmed,
            at: vault.created_at,
        };
        self.append_trade(&request.creator_id, record, &mut gaps).await;

        Ok(CreateVaultReceipt {
            vault,
            debited_sol: deposit,
            reconciliation_gaps: gaps,
        })
    }

    /// Add capital to an active vault from the user's balance.
    pub async fn deposit(
        &self,
        user_id: &UserId,
        vault_id: &VaultId,
        amount_sol: Decimal,
    ) -> Result<DepositReceipt, EngineError> {
        if !amount_sol.is_positive() {
            return Err(EngineError::Validation(format!(
                "deposit amount must be positive, got {}",
                amount_sol
            )));
        }

        self.balances.debit(user_id, amount_sol).await?;
        let vault = match self.vaults.deposit(vault_id, user_id, amount_sol).await {
            Ok(vault) => vault,
            Err(err) => return Err(self.refund_debit(user_id, amount_sol, err).await),
        };

        let mut gaps = Vec::new();
        let record = TradeRecord {
            id: TradeRecord::deposit_id(vault_id),
            kind: TradeKind::Deposit,
            user_id: user_id.clone(),
            vault_id: vault_id.clone(),
            token_mint: vault.token_mint.clone(),
            position_id: None,
            amount_sol,
            borrowed_sol: None,
            size_in_underlying: None,
            price_usd: None,
            sol_price_usd: None,
            realized_pnl_sol: None,
            fee_sol: None,
            liquidated: false,
            status: RecordStatus::Confirmed,
            at: self.clock.now_ms(),
        };
        self.append_trade(user_id, record, &mut gaps).await;

        info!(user = %user_id, vault = %vault_id, amount = %amount_sol, "vault deposit");
        Ok(DepositReceipt {
            vault,
            debited_sol: amount_sol,
            reconciliation_gaps: gaps,
        })
    }

    /// Pay out a vault owner's accrued fee lamports to their balance.
    /// Claiming with nothing accrued is a clean no-op.
    pub async fn claim_fees(
        &self,
        user_id: &UserId,
        vault_id: &VaultId,
    ) -> Result<ClaimReceipt, EngineError> {
        let (vault, lamports) = self.vaults.claim_fees(vault_id, user_id).await?;
        if lamports == 0 {
            return Ok(ClaimReceipt {
                vault,
                claimed_sol: Decimal::zero(),
                claimed_lamports: 0,
                reconciliation_gaps: Vec::new(),
            });
        }

        let claimed_sol = lamports_to_sol(lamports);
        if let Err(err) = self.balances.credit(user_id, claimed_sol).await {
            // Put the accrual back so nothing is lost.
            let restore = [(user_id.clone(), lamports)];
            return Err(
                match self.vaults.credit_owner_shares(vault_id, &restore).await {
                    Ok(_) => err,
                    Err(restore_err) => EngineError::Reconciliation(format!(
                        "fee claim credit failed ({}) and restoring the accrual failed too \
                         ({}); {} lamports for {} are unaccounted on vault {}",
                        err, restore_err, lamports, user_id, vault_id
                    )),
                },
            );
        }

        let mut gaps = Vec::new();
        let record = TradeRecord {
            id: TradeRecord::claim_id(vault_id),
            kind: TradeKind::FeeClaim,
            user_id: user_id.clone(),
            vault_id: vault_id.clone(),
            token_mint: vault.token_mint.clone(),
            position_id: None,
            amount_sol: claimed_sol,
            borrowed_sol: None,
            size_in_underlying: None,
            price_usd: None,
            sol_price_usd: None,
            realized_pnl_sol: None,
            fee_sol: None,
            liquidated: false,
            status: RecordStatus::Confirmed,
            at: self.clock.now_ms(),
        };
        self.append_trade(user_id, record, &mut gaps).await;

        info!(user = %user_id, vault = %vault_id, lamports, "fees claimed");
        Ok(ClaimReceipt {
            vault,
            claimed_sol,
            claimed_lamports: lamports,
            reconciliation_gaps: gaps,
        })
    }

    /// Change a vault's status. Only the creator may, and CLOSED is
    /// terminal.
    pub async fn set_vault_status(
        &self,
        actor: &UserId,
        vault_id: &VaultId,
        status: VaultStatus,
    ) -> Result<Vault, EngineError> {
        let vault = self.vaults.get_vault(vault_id).await?;
        if vault.creator_id != *actor {
            return Err(EngineError::Validation(format!(
                "only the creator of vault {} may change its status",
                vault_id
            )));
        }
        let updated = self.vaults.set_status(vault_id, status).await?;
        info!(vault = %vault_id, status = %status, "vault status changed");
        Ok(updated)
    }

    async fn refund_debit(
        &self,
        user_id: &UserId,
        amount: Decimal,
        cause: EngineError,
    ) -> EngineError {
        if !amount.is_positive() {
            return cause;
        }
        match self.balances.credit(user_id, amount).await {
            Ok(_) => cause,
            Err(refund_err) => EngineError::Reconciliation(format!(
                "operation failed ({}) and refunding {} to {} failed too ({})",
                cause, amount, user_id, refund_err
            )),
        }
    }

    async fn append_trade(&self, user_id: &UserId, record: TradeRecord, gaps: &mut Vec<String>) {
        let value = match encode(&record) {
            Ok(value) => value,
            Err(err) => {
                gaps.push(format!("trade record {} not encoded: {}", record.id, err));
                return;
            }
        };
        let entries = vec![(paths::trade(user_id, &record.id), value)];
        if let Err(err) = self.store.write_many(entries).await {
            warn!(user = %user_id, record = %record.id, error = %err, "trade record write failed");
            gaps.push(format!("trade record {} not written: {}", record.id, err));
        }
    }
}

fn validate_params(params: &VaultParams) -> Result<(), EngineError> {
    for (name, pct) in [
        ("vault_share_pct", params.vault_share_pct),
        ("owner_keep_pct", params.owner_keep_pct),
    ] {
        if pct.is_negative() || pct > Decimal::one() {
            return Err(EngineError::Validation(format!(
                "{} must be between 0 and 1, got {}",
                name, pct
            )));
        }
    }
    Ok(())
}
