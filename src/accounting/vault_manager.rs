//! Vault record updates: capital reserve/release, deposits, owner fee
//! accrual, and claims. Every mutation is one CAS on the vault record,
//! so multi-field changes (tvl plus borrowed, or a batch of owner
//! credits) land atomically or not at all.

use crate::domain::{Clock, Decimal, MintAddress, UserId, Vault, VaultId, VaultStatus};
use crate::error::EngineError;
use crate::ledger::{paths, CasVerdict, LedgerStore};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

enum VaultRead {
    Missing,
    Malformed,
    Vault(Box<Vault>),
}

fn classify(raw: Option<&Value>) -> VaultRead {
    match raw {
        None => VaultRead::Missing,
        Some(value) => match serde_json::from_value::<Vault>(value.clone()) {
            Ok(vault) => VaultRead::Vault(Box::new(vault)),
            Err(_) => VaultRead::Malformed,
        },
    }
}

fn commit_vault(vault: &Vault) -> CasVerdict {
    match serde_json::to_value(vault) {
        Ok(value) => CasVerdict::Commit(value),
        // Our vault serializer cannot fail; aborting beats writing junk.
        Err(_) => CasVerdict::Abort,
    }
}

/// Manages vault records in the ledger.
#[derive(Debug, Clone)]
pub struct VaultCapitalManager {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl VaultCapitalManager {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        VaultCapitalManager { store, clock }
    }

    /// Fetch a vault or fail with [`EngineError::VaultNotFound`].
    pub async fn get_vault(&self, vault_id: &VaultId) -> Result<Vault, EngineError> {
        let raw = self.store.read(&paths::vault(vault_id)).await?;
        match classify(raw.as_ref()) {
            VaultRead::Vault(vault) => Ok(*vault),
            VaultRead::Missing => Err(EngineError::VaultNotFound(vault_id.clone())),
            VaultRead::Malformed => Err(EngineError::Validation(format!(
                "vault record {} is malformed",
                vault_id
            ))),
        }
    }

    /// Look up the vault owning a token mint, if any.
    pub async fn find_vault_by_mint(
        &self,
        mint: &MintAddress,
    ) -> Result<Option<Vault>, EngineError> {
        let index = self.store.read(&paths::vault_mint_index(mint)).await?;
        let vault_id = match index {
            Some(Value::String(id)) => VaultId::new(id),
            _ => return Ok(None),
        };
        match self.get_vault(&vault_id).await {
            Ok(vault) => Ok(Some(vault)),
            Err(EngineError::VaultNotFound(_)) => {
                warn!(mint = %mint, vault = %vault_id, "mint index points at a missing vault");
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    /// Create a vault for a mint, enforcing one vault per mint through
    /// a create-if-absent claim on the mint index.
    ///
    /// # Errors
    /// Returns [`EngineError::DuplicateVaultMint`] when the mint is
    /// already claimed.
    pub async fn create_vault(
        &self,
        creator_id: &UserId,
        mint: &MintAddress,
        seed_sol: Decimal,
        params: crate::domain::VaultParams,
    ) -> Result<Vault, EngineError> {
        if seed_sol.is_negative() {
            return Err(EngineError::Validation(format!(
                "seed capital must not be negative, got {}",
                seed_sol
            )));
        }

        let vault_id = VaultId::generate();
        let vault = Vault::create(
            vault_id.clone(),
            mint.clone(),
            creator_id.clone(),
            seed_sol,
            params,
            self.clock.now_ms(),
        );

        // Claim the mint first; the index entry is the uniqueness gate.
        let index_path = paths::vault_mint_index(mint);
        let claim = {
            let vault_id = vault_id.clone();
            move |current: Option<&Value>| match current {
                None | Some(Value::Null) => {
                    CasVerdict::Commit(Value::String(vault_id.as_str().to_string()))
                }
                Some(_) => CasVerdict::Abort,
            }
        };
        let claimed = self.store.compare_and_swap(&index_path, &claim).await?;
        if !claimed.committed {
            return Err(EngineError::DuplicateVaultMint(mint.clone()));
        }

        let record = commit_vault(&vault);
        let create = move |current: Option<&Value>| match current {
            None => record.clone(),
            Some(_) => CasVerdict::Abort,
        };
        let written = match self
            .store
            .compare_and_swap(&paths::vault(&vault_id), &create)
            .await
        {
            Ok(outcome) => outcome.committed,
            Err(err) => {
                self.clear_mint_index(mint).await;
                return Err(err.into());
            }
        };
        if !written {
            self.clear_mint_index(mint).await;
            return Err(EngineError::Validation(format!(
                "vault id {} already exists",
                vault_id
            )));
        }

        info!(vault = %vault_id, mint = %mint, creator = %creator_id, %seed_sol, "vault created");
        Ok(vault)
    }

    async fn clear_mint_index(&self, mint: &MintAddress) {
        let release = |_: Option<&Value>| CasVerdict::Commit(Value::Null);
        if let Err(err) = self
            .store
            .compare_and_swap(&paths::vault_mint_index(mint), &release)
            .await
        {
            warn!(mint = %mint, error = %err, "failed to release mint index claim");
        }
    }

    /// Add capital to an active vault on behalf of a user.
    pub async fn deposit(
        &self,
        vault_id: &VaultId,
        user: &UserId,
        amount: Decimal,
    ) -> Result<Vault, EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::Validation(format!(
                "deposit amount must be positive, got {}",
                amount
            )));
        }
        let (committed, observed) = self
            .cas_vault(vault_id, |vault| {
                if !vault.is_active() {
                    return false;
                }
                vault.deposit(user, amount);
                true
            })
            .await?;
        if committed {
            return observed_vault(vault_id, observed);
        }
        Err(self.refusal(vault_id, observed, |vault| {
            EngineError::VaultNotActive {
                vault: vault_id.clone(),
                status: vault.status,
            }
        }))
    }

    /// Carve a borrow out of an active vault's available capital.
    ///
    /// # Errors
    /// Refuses with [`EngineError::InsufficientVaultCapital`] when the
    /// vault cannot cover the amount, and
    /// [`EngineError::VaultNotActive`] when it is paused or closed.
    pub async fn reserve_borrow(
        &self,
        vault_id: &VaultId,
        amount: Decimal,
    ) -> Result<Vault, EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::Validation(format!(
                "borrow amount must be positive, got {}",
                amount
            )));
        }
        let (committed, observed) = self
            .cas_vault(vault_id, |vault| {
                vault.is_active() && vault.try_reserve(amount)
            })
            .await?;
        if committed {
            return observed_vault(vault_id, observed);
        }
        Err(self.refusal(vault_id, observed, |vault| {
            if !vault.is_active() {
                EngineError::VaultNotActive {
                    vault: vault_id.clone(),
                    status: vault.status,
                }
            } else {
                EngineError::InsufficientVaultCapital {
                    vault: vault_id.clone(),
                    requested: amount,
                    available: vault.tvl,
                }
            }
        }))
    }

    /// Return borrowed principal to the vault. Works regardless of
    /// vault status so settlements and compensations are never blocked.
    pub async fn release_borrow(
        &self,
        vault_id: &VaultId,
        amount: Decimal,
    ) -> Result<Vault, EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::Validation(format!(
                "release amount must be positive, got {}",
                amount
            )));
        }
        let (committed, observed) = self
            .cas_vault(vault_id, |vault| {
                vault.release(amount);
                true
            })
            .await?;
        if committed {
            return observed_vault(vault_id, observed);
        }
        Err(self.missing_or_malformed(vault_id, observed))
    }

    /// Re-carve a borrow that was released by a settlement that then
    /// failed. Skips the status gate; the capital was carved before.
    pub async fn restore_borrow(
        &self,
        vault_id: &VaultId,
        amount: Decimal,
    ) -> Result<Vault, EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::Validation(format!(
                "restore amount must be positive, got {}",
                amount
            )));
        }
        let (committed, observed) = self
            .cas_vault(vault_id, |vault| vault.try_reserve(amount))
            .await?;
        if committed {
            return observed_vault(vault_id, observed);
        }
        Err(self.refusal(vault_id, observed, |vault| {
            EngineError::InsufficientVaultCapital {
                vault: vault_id.clone(),
                requested: amount,
                available: vault.tvl,
            }
        }))
    }

    /// Accrue fee lamports to several owners in one atomic vault write.
    pub async fn credit_owner_shares(
        &self,
        vault_id: &VaultId,
        credits: &[(UserId, u64)],
    ) -> Result<Vault, EngineError> {
        if credits.iter().all(|(_, lamports)| *lamports == 0) {
            return self.get_vault(vault_id).await;
        }
        let (committed, observed) = self
            .cas_vault(vault_id, |vault| {
                for (owner, lamports) in credits {
                    vault.credit_owner_fees(owner, *lamports);
                }
                true
            })
            .await?;
        if committed {
            return observed_vault(vault_id, observed);
        }
        Err(self.missing_or_malformed(vault_id, observed))
    }

    /// Zero out and report a user's claimable fee lamports. A claim of
    /// zero is a clean no-op that writes nothing.
    pub async fn claim_fees(
        &self,
        vault_id: &VaultId,
        user: &UserId,
    ) -> Result<(Vault, u64), EngineError> {
        let claimed = AtomicU64::new(0);
        let (committed, observed) = self
            .cas_vault(vault_id, |vault| {
                let taken = vault.take_claimable(user);
                claimed.store(taken, Ordering::Relaxed);
                taken > 0
            })
            .await?;
        let lamports = claimed.load(Ordering::Relaxed);
        match (committed, lamports) {
            (true, _) => Ok((observed_vault(vault_id, observed)?, lamports)),
            (false, 0) => Ok((self.missing_or_vault(vault_id, observed)?, 0)),
            (false, _) => Err(self.missing_or_malformed(vault_id, observed)),
        }
    }

    /// Flip a vault's lifecycle status. CLOSED is terminal: once there,
    /// the only accepted transition is the idempotent one.
    pub async fn set_status(
        &self,
        vault_id: &VaultId,
        status: VaultStatus,
    ) -> Result<Vault, EngineError> {
        let (committed, observed) = self
            .cas_vault(vault_id, |vault| {
                if vault.status == VaultStatus::Closed && status != VaultStatus::Closed {
                    return false;
                }
                vault.status = status;
                true
            })
            .await?;
        if committed {
            return observed_vault(vault_id, observed);
        }
        Err(self.refusal(vault_id, observed, |vault| {
            EngineError::Validation(format!(
                "vault {} is {} and cannot change status",
                vault_id, vault.status
            ))
        }))
    }

    async fn cas_vault<F>(
        &self,
        vault_id: &VaultId,
        apply: F,
    ) -> Result<(bool, Option<Value>), EngineError>
    where
        F: Fn(&mut Vault) -> bool + Send + Sync,
    {
        let now = self.clock.now_ms();
        let update = move |current: Option<&Value>| match classify(current) {
            VaultRead::Missing | VaultRead::Malformed => CasVerdict::Abort,
            VaultRead::Vault(mut vault) => {
                if !apply(&mut vault) {
                    return CasVerdict::Abort;
                }
                vault.updated_at = now;
                commit_vault(&vault)
            }
        };
        let outcome = self
            .store
            .compare_and_swap(&paths::vault(vault_id), &update)
            .await?;
        Ok((outcome.committed, outcome.value))
    }

    fn refusal<F>(&self, vault_id: &VaultId, observed: Option<Value>, reason: F) -> EngineError
    where
        F: FnOnce(&Vault) -> EngineError,
    {
        match classify(observed.as_ref()) {
            VaultRead::Missing => EngineError::VaultNotFound(vault_id.clone()),
            VaultRead::Malformed => {
                EngineError::Validation(format!("vault record {} is malformed", vault_id))
            }
            VaultRead::Vault(vault) => reason(&vault),
        }
    }

    fn missing_or_malformed(&self, vault_id: &VaultId, observed: Option<Value>) -> EngineError {
        self.refusal(vault_id, observed, |_| {
            EngineError::Validation(format!(
                "vault {} refused an unconditional update",
                vault_id
            ))
        })
    }

    fn missing_or_vault(
        &self,
        vault_id: &VaultId,
        observed: Option<Value>,
    ) -> Result<Vault, EngineError> {
        match classify(observed.as_ref()) {
            VaultRead::Vault(vault) => Ok(*vault),
            VaultRead::Missing => Err(EngineError::VaultNotFound(vault_id.clone())),
            VaultRead::Malformed => Err(EngineError::Validation(format!(
                "vault record {} is malformed",
                vault_id
            ))),
        }
    }
}

fn observed_vault(vault_id: &VaultId, observed: Option<Value>) -> Result<Vault, EngineError> {
    match classify(observed.as_ref()) {
        VaultRead::Vault(vault) => Ok(*vault),
        _ => Err(EngineError::Validation(format!(
            "vault record {} is malformed",
            vault_id
        ))),
    }
}
