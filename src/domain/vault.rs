//! Vault records: pooled lending capital with fee parameters and an
//! ownership composition that fee distribution reads from.

use crate::domain::coerce;
use crate::domain::{Decimal, MintAddress, TimeMs, UserId, VaultId};
use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_open_fee_bps() -> u32 {
    1_000
}

fn default_close_fee_bps() -> u32 {
    1_000
}

fn default_owner_keep_pct() -> Decimal {
    Decimal::new(RustDecimal::new(6, 1))
}

fn default_vault_share_pct() -> Decimal {
    Decimal::new(RustDecimal::new(7, 1))
}

/// Lifecycle status of a vault.
///
/// Paused and closed vaults stop accepting borrows and deposits; closes
/// and fee claims against them still settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultStatus {
    Active,
    Paused,
    Closed,
}

impl Default for VaultStatus {
    fn default() -> Self {
        VaultStatus::Active
    }
}

impl VaultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VaultStatus::Active => "active",
            VaultStatus::Paused => "paused",
            VaultStatus::Closed => "closed",
        }
    }
}

impl std::fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fee and split parameters, fixed at vault creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultParams {
    /// Fee charged on a position's collateral at open, in basis points.
    #[serde(default = "default_open_fee_bps")]
    pub open_fee_bps: u32,
    /// Share of realized profit owed to vault owners at close, in basis points.
    #[serde(default = "default_close_fee_bps")]
    pub close_fee_bps: u32,
    /// Fraction of an owner's fee portion the owner keeps; the rest
    /// routes to the platform. Individual contributors may override.
    #[serde(with = "coerce::decimal_field", default = "default_owner_keep_pct")]
    pub owner_keep_pct: Decimal,
    /// Fraction of an open fee routed to vault owners as a pool; the
    /// rest goes straight to the platform.
    #[serde(with = "coerce::decimal_field", default = "default_vault_share_pct")]
    pub vault_share_pct: Decimal,
}

impl Default for VaultParams {
    fn default() -> Self {
        VaultParams {
            open_fee_bps: default_open_fee_bps(),
            close_fee_bps: default_close_fee_bps(),
            owner_keep_pct: default_owner_keep_pct(),
            vault_share_pct: default_vault_share_pct(),
        }
    }
}

/// A non-creator capital contributor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    #[serde(with = "coerce::decimal_field", default)]
    pub contributed_sol: Decimal,
    /// Per-owner keep override; the vault default applies when absent.
    #[serde(
        with = "coerce::decimal_opt_field",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub keep_pct: Option<Decimal>,
    /// Fee earnings awaiting claim, in lamports.
    #[serde(with = "coerce::lamports_field", default)]
    pub accrued_fees_lamports: u64,
}

/// Who put capital into the vault. The creator's stake lives here; other
/// contributors are keyed by user id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultComposition {
    #[serde(with = "coerce::decimal_field", default)]
    pub creator_contributed_sol: Decimal,
    #[serde(default)]
    pub contributors: BTreeMap<String, Contributor>,
}

/// A lending vault for a single token mint.
///
/// `tvl` is the capital currently available to lend; borrows carve out
/// of it and releases return to it, so `tvl >= 0` must hold at all
/// times. `total_borrowed` tracks outstanding principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vault {
    pub id: VaultId,
    pub token_mint: MintAddress,
    pub creator_id: UserId,
    #[serde(default)]
    pub status: VaultStatus,
    #[serde(with = "coerce::decimal_field", default)]
    pub tvl: Decimal,
    #[serde(with = "coerce::decimal_field", default)]
    pub total_borrowed: Decimal,
    #[serde(default)]
    pub params: VaultParams,
    #[serde(default)]
    pub composition: VaultComposition,
    /// Creator's claimable fee earnings, in lamports.
    #[serde(with = "coerce::lamports_field", default)]
    pub fees_for_creator: u64,
    #[serde(default)]
    pub created_at: TimeMs,
    #[serde(default)]
    pub updated_at: TimeMs,
}

impl Vault {
    /// Build a fresh vault seeded with the creator's capital.
    pub fn create(
        id: VaultId,
        token_mint: MintAddress,
        creator_id: UserId,
        seed_sol: Decimal,
        params: VaultParams,
        at: TimeMs,
    ) -> Self {
        Vault {
            id,
            token_mint,
            creator_id,
            status: VaultStatus::Active,
            tvl: seed_sol,
            total_borrowed: Decimal::zero(),
            params,
            composition: VaultComposition {
                creator_contributed_sol: seed_sol,
                contributors: BTreeMap::new(),
            },
            fees_for_creator: 0,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == VaultStatus::Active
    }

    /// Carve borrowed principal out of available capital. Returns false
    /// (without mutating) when the vault cannot cover the amount.
    pub fn try_reserve(&mut self, amount: Decimal) -> bool {
        if amount.is_negative() || amount > self.tvl {
            return false;
        }
        self.tvl = self.tvl - amount;
        self.total_borrowed = self.total_borrowed + amount;
        true
    }

    /// Return previously reserved principal to available capital.
    /// Outstanding principal clamps at zero so a stray double release
    /// cannot drive it negative.
    pub fn release(&mut self, amount: Decimal) {
        if amount.is_negative() {
            return;
        }
        self.tvl = self.tvl + amount;
        self.total_borrowed = (self.total_borrowed - amount).max(Decimal::zero());
    }

    /// Add capital on behalf of a user. Creator deposits grow the
    /// creator stake; anyone else upserts a contributor entry.
    pub fn deposit(&mut self, user: &UserId, amount: Decimal) {
        self.tvl = self.tvl + amount;
        if *user == self.creator_id {
            self.composition.creator_contributed_sol =
                self.composition.creator_contributed_sol + amount;
        } else {
            let entry = self
                .composition
                .contributors
                .entry(user.as_str().to_string())
                .or_default();
            entry.contributed_sol = entry.contributed_sol + amount;
        }
    }

    /// Accrue claimable fee lamports to a vault owner.
    pub fn credit_owner_fees(&mut self, owner: &UserId, lamports: u64) {
        if lamports == 0 {
            return;
        }
        if *owner == self.creator_id {
            self.fees_for_creator = self.fees_for_creator.saturating_add(lamports);
        } else {
            let entry = self
                .composition
                .contributors
                .entry(owner.as_str().to_string())
                .or_default();
            entry.accrued_fees_lamports = entry.accrued_fees_lamports.saturating_add(lamports);
        }
    }

    /// Zero out and return a user's claimable fee lamports.
    pub fn take_claimable(&mut self, user: &UserId) -> u64 {
        if *user == self.creator_id {
            std::mem::take(&mut self.fees_for_creator)
        } else {
            match self.composition.contributors.get_mut(user.as_str()) {
                Some(entry) => std::mem::take(&mut entry.accrued_fees_lamports),
                None => 0,
            }
        }
    }

    /// Total capital ever contributed across creator and contributors.
    pub fn total_contributed_sol(&self) -> Decimal {
        self.composition
            .contributors
            .values()
            .map(|c| c.contributed_sol)
            .sum::<Decimal>()
            + self.composition.creator_contributed_sol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn sample_vault() -> Vault {
        Vault::create(
            VaultId::new("vault-1"),
            MintAddress::new("MintAAA"),
            UserId::new("creator"),
            d("100"),
            VaultParams::default(),
            TimeMs::new(1_700_000_000_000),
        )
    }

    #[test]
    fn test_create_seeds_creator_stake() {
        let vault = sample_vault();
        assert_eq!(vault.tvl, d("100"));
        assert_eq!(vault.total_borrowed, Decimal::zero());
        assert_eq!(vault.composition.creator_contributed_sol, d("100"));
        assert!(vault.composition.contributors.is_empty());
        assert!(vault.is_active());
    }

    #[test]
    fn test_reserve_and_release_round_trip() {
        let mut vault = sample_vault();
        assert!(vault.try_reserve(d("40")));
        assert_eq!(vault.tvl, d("60"));
        assert_eq!(vault.total_borrowed, d("40"));

        vault.release(d("40"));
        assert_eq!(vault.tvl, d("100"));
        assert_eq!(vault.total_borrowed, Decimal::zero());
    }

    #[test]
    fn test_reserve_rejects_when_capital_short() {
        let mut vault = sample_vault();
        assert!(!vault.try_reserve(d("150")));
        assert_eq!(vault.tvl, d("100"));
        assert_eq!(vault.total_borrowed, Decimal::zero());
    }

    #[test]
    fn test_reserve_rejects_negative_amount() {
        let mut vault = sample_vault();
        assert!(!vault.try_reserve(d("-5")));
        assert_eq!(vault.tvl, d("100"));
    }

    #[test]
    fn test_release_clamps_borrowed_at_zero() {
        let mut vault = sample_vault();
        assert!(vault.try_reserve(d("10")));
        vault.release(d("10"));
        vault.release(d("10"));
        assert_eq!(vault.total_borrowed, Decimal::zero());
        assert_eq!(vault.tvl, d("110"));
    }

    #[test]
    fn test_deposit_routes_to_creator_or_contributor() {
        let mut vault = sample_vault();
        vault.deposit(&UserId::new("creator"), d("25"));
        assert_eq!(vault.composition.creator_contributed_sol, d("125"));

        vault.deposit(&UserId::new("lp-1"), d("50"));
        vault.deposit(&UserId::new("lp-1"), d("10"));
        assert_eq!(
            vault.composition.contributors["lp-1"].contributed_sol,
            d("60")
        );
        assert_eq!(vault.tvl, d("185"));
        assert_eq!(vault.total_contributed_sol(), d("185"));
    }

    #[test]
    fn test_credit_and_take_owner_fees() {
        let mut vault = sample_vault();
        vault.deposit(&UserId::new("lp-1"), d("50"));

        vault.credit_owner_fees(&UserId::new("creator"), 600_000);
        vault.credit_owner_fees(&UserId::new("lp-1"), 150_000);
        vault.credit_owner_fees(&UserId::new("lp-1"), 50_000);
        assert_eq!(vault.fees_for_creator, 600_000);
        assert_eq!(
            vault.composition.contributors["lp-1"].accrued_fees_lamports,
            200_000
        );

        assert_eq!(vault.take_claimable(&UserId::new("lp-1")), 200_000);
        assert_eq!(vault.take_claimable(&UserId::new("lp-1")), 0);
        assert_eq!(vault.take_claimable(&UserId::new("creator")), 600_000);
        assert_eq!(vault.take_claimable(&UserId::new("stranger")), 0);
    }

    #[test]
    fn test_deserializes_sparse_record_with_defaults() {
        let vault: Vault = serde_json::from_value(json!({
            "id": "vault-9",
            "token_mint": "MintZZZ",
            "creator_id": "creator",
            "tvl": 12.5
        }))
        .unwrap();
        assert_eq!(vault.tvl, d("12.5"));
        assert_eq!(vault.total_borrowed, Decimal::zero());
        assert_eq!(vault.status, VaultStatus::Active);
        assert_eq!(vault.params.open_fee_bps, 1_000);
        assert_eq!(vault.params.owner_keep_pct, d("0.6"));
        assert_eq!(vault.fees_for_creator, 0);
    }

    #[test]
    fn test_serde_round_trip_uses_canonical_strings() {
        let mut vault = sample_vault();
        vault.deposit(&UserId::new("lp-1"), d("0.000000001"));
        vault.credit_owner_fees(&UserId::new("lp-1"), 42);

        let value = serde_json::to_value(&vault).unwrap();
        assert_eq!(value["tvl"], json!("100.000000001"));
        assert_eq!(value["status"], json!("active"));

        let back: Vault = serde_json::from_value(value).unwrap();
        assert_eq!(back, vault);
    }
}
