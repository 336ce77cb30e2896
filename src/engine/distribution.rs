//! Pro-rata fee distribution over vault owners, in whole lamports.
//!
//! Portions floor, keeps floor, and every lamport of rounding dust goes
//! to the platform, so `platform + sum(keeps) == total` holds exactly
//! for any input.

use crate::domain::{Decimal, UserId, Vault};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

/// One owner's claim on a fee pool: their capital weight and an
/// optional keep override.
#[derive(Debug, Clone)]
pub struct OwnerStake {
    pub id: UserId,
    /// Capital contributed, in SOL. Weights are taken at whole-lamport
    /// precision.
    pub capital: Decimal,
    /// Fraction of the owner's portion they keep; the caller's default
    /// applies when absent.
    pub keep_pct: Option<Decimal>,
}

/// One owner's slice of a distributed fee.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerShare {
    pub id: UserId,
    /// Pro-rata portion of the total, floored.
    pub portion: u64,
    /// What the owner keeps of their portion, floored.
    pub keep: u64,
    /// `portion - keep`, routed to the platform.
    pub platform_cut: u64,
}

/// Result of distributing a fee pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub per_owner: Vec<OwnerShare>,
    /// Rounding remainder plus every owner's platform cut.
    pub platform: u64,
    /// Sum of owner portions before keeps.
    pub allocated: u64,
    /// `total - allocated`: lamports no portion claimed.
    pub remainder: u64,
}

impl Distribution {
    /// Sum of all owner keeps.
    pub fn total_keeps(&self) -> u64 {
        self.per_owner.iter().map(|share| share.keep).sum()
    }
}

fn everything_to_platform(total_lamports: u64) -> Distribution {
    Distribution {
        per_owner: Vec::new(),
        platform: total_lamports,
        allocated: 0,
        remainder: total_lamports,
    }
}

/// Split `total_lamports` across owners by capital weight.
///
/// Each portion is `total * capital_i / total_capital` in exact integer
/// arithmetic, floored. Keeps floor again, and the platform collects
/// both the unallocated remainder and every owner's non-kept cut. With
/// no owners or no capital the whole pool goes to the platform.
pub fn distribute(
    total_lamports: u64,
    owners: &[OwnerStake],
    default_keep_pct: Decimal,
) -> Distribution {
    if total_lamports == 0 || owners.is_empty() {
        return everything_to_platform(total_lamports);
    }

    let weights: Vec<u64> = owners
        .iter()
        .map(|owner| owner.capital.to_lamports_floor())
        .collect();
    let total_weight: u128 = weights.iter().map(|w| *w as u128).sum();
    if total_weight == 0 {
        return everything_to_platform(total_lamports);
    }

    let default_keep = clamp_unit(default_keep_pct);
    let mut per_owner = Vec::with_capacity(owners.len());
    let mut allocated: u64 = 0;
    let mut platform_cuts: u64 = 0;

    for (owner, weight) in owners.iter().zip(weights) {
        let portion = (total_lamports as u128 * weight as u128 / total_weight) as u64;
        let keep_pct = owner.keep_pct.map_or(default_keep, clamp_unit);
        let keep = (Decimal::from(portion) * keep_pct)
            .floor()
            .inner()
            .to_u64()
            .unwrap_or(0);
        let platform_cut = portion - keep;

        allocated += portion;
        platform_cuts += platform_cut;
        per_owner.push(OwnerShare {
            id: owner.id.clone(),
            portion,
            keep,
            platform_cut,
        });
    }

    let remainder = total_lamports - allocated;
    Distribution {
        per_owner,
        platform: remainder + platform_cuts,
        allocated,
        remainder,
    }
}

/// Split a fee pool carved for vault owners across the vault's
/// composition, using the vault's default keep. The pool was already
/// separated from the platform's share, so when no stake registers at
/// lamport precision the whole pool falls back to the creator instead
/// of leaking to the platform.
pub fn distribute_vault_share(vault: &Vault, total_lamports: u64) -> Distribution {
    let stakes = stakes_from_vault(vault);
    let weightless = stakes
        .iter()
        .all(|stake| stake.capital.to_lamports_floor() == 0);
    if total_lamports > 0 && weightless {
        return Distribution {
            per_owner: vec![OwnerShare {
                id: vault.creator_id.clone(),
                portion: total_lamports,
                keep: total_lamports,
                platform_cut: 0,
            }],
            platform: 0,
            allocated: total_lamports,
            remainder: 0,
        };
    }
    distribute(total_lamports, &stakes, vault.params.owner_keep_pct)
}

/// Build owner stakes from a vault's composition: the creator first,
/// then contributors in key order.
pub fn stakes_from_vault(vault: &Vault) -> Vec<OwnerStake> {
    let mut stakes = vec![OwnerStake {
        id: vault.creator_id.clone(),
        capital: vault.composition.creator_contributed_sol,
        keep_pct: None,
    }];
    for (id, contributor) in &vault.composition.contributors {
        stakes.push(OwnerStake {
            id: UserId::new(id.clone()),
            capital: contributor.contributed_sol,
            keep_pct: contributor.keep_pct,
        });
    }
    stakes
}

fn clamp_unit(pct: Decimal) -> Decimal {
    pct.max(Decimal::zero()).min(Decimal::one())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn stake(id: &str, capital: &str) -> OwnerStake {
        OwnerStake {
            id: UserId::new(id),
            capital: d(capital),
            keep_pct: None,
        }
    }

    fn assert_exact(total: u64, distribution: &Distribution) {
        assert_eq!(
            distribution.platform + distribution.total_keeps(),
            total,
            "lamports must be conserved"
        );
        assert_eq!(
            distribution.allocated + distribution.remainder,
            total,
            "portions plus remainder must cover the total"
        );
    }

    #[test]
    fn test_proportional_split_with_keeps() {
        let owners = vec![stake("creator", "30000"), stake("lp-1", "20000")];
        let distribution = distribute(1_000_000, &owners, d("0.6"));

        assert_eq!(distribution.per_owner[0].portion, 600_000);
        assert_eq!(distribution.per_owner[0].keep, 360_000);
        assert_eq!(distribution.per_owner[0].platform_cut, 240_000);
        assert_eq!(distribution.per_owner[1].portion, 400_000);
        assert_eq!(distribution.per_owner[1].keep, 240_000);
        assert_eq!(distribution.platform, 400_000);
        assert_eq!(distribution.allocated, 1_000_000);
        assert_eq!(distribution.remainder, 0);
        assert_exact(1_000_000, &distribution);
    }

    #[test]
    fn test_tiny_pool_rounds_everything_to_platform() {
        let owners = vec![stake("a", "1"), stake("b", "1")];
        let distribution = distribute(3, &owners, d("0.6"));

        // Each portion is floor(3/2) = 1; keeps floor to 0.
        assert_eq!(distribution.per_owner[0].portion, 1);
        assert_eq!(distribution.per_owner[0].keep, 0);
        assert_eq!(distribution.per_owner[1].keep, 0);
        assert_eq!(distribution.remainder, 1);
        assert_eq!(distribution.platform, 3);
        assert_exact(3, &distribution);
    }

    #[test]
    fn test_no_owners_or_capital_goes_to_platform() {
        let distribution = distribute(5_000, &[], d("0.6"));
        assert_eq!(distribution.platform, 5_000);
        assert!(distribution.per_owner.is_empty());
        assert_exact(5_000, &distribution);

        let dustless = vec![OwnerStake {
            id: UserId::new("a"),
            capital: d("0.0000000001"),
            keep_pct: None,
        }];
        let distribution = distribute(5_000, &dustless, d("0.6"));
        assert_eq!(distribution.platform, 5_000);
        assert_exact(5_000, &distribution);
    }

    #[test]
    fn test_keep_override_beats_default() {
        let owners = vec![
            stake("creator", "50"),
            OwnerStake {
                id: UserId::new("lp-1"),
                capital: d("50"),
                keep_pct: Some(d("1")),
            },
        ];
        let distribution = distribute(1_000_000, &owners, d("0.6"));
        assert_eq!(distribution.per_owner[0].keep, 300_000);
        assert_eq!(distribution.per_owner[1].keep, 500_000);
        assert_eq!(distribution.per_owner[1].platform_cut, 0);
        assert_exact(1_000_000, &distribution);
    }

    #[test]
    fn test_uneven_weights_conserve_lamports() {
        let owners = vec![
            stake("a", "0.000000007"),
            stake("b", "0.000000011"),
            stake("c", "0.000000013"),
        ];
        // 31 weight units over 100 lamports: nothing divides evenly.
        let distribution = distribute(100, &owners, d("0.37"));
        assert_exact(100, &distribution);
        assert!(distribution.remainder > 0);
    }

    #[test]
    fn test_zero_total_is_a_no_op_distribution() {
        let owners = vec![stake("a", "10")];
        let distribution = distribute(0, &owners, d("0.6"));
        assert_eq!(distribution.platform, 0);
        assert!(distribution.per_owner.is_empty());
    }

    #[test]
    fn test_vault_share_follows_composition_and_default_keep() {
        use crate::domain::{MintAddress, TimeMs, VaultId, VaultParams};

        let mut vault = Vault::create(
            VaultId::new("vault-1"),
            MintAddress::new("MintAAA"),
            UserId::new("creator"),
            d("30000"),
            VaultParams::default(),
            TimeMs::new(0),
        );
        vault.deposit(&UserId::new("lp-1"), d("20000"));

        let distribution = distribute_vault_share(&vault, 1_000_000);
        assert_eq!(distribution.per_owner[0].portion, 600_000);
        assert_eq!(distribution.per_owner[0].keep, 360_000);
        assert_eq!(distribution.per_owner[1].portion, 400_000);
        assert_exact(1_000_000, &distribution);
    }

    #[test]
    fn test_weightless_vault_share_falls_back_to_creator() {
        use crate::domain::{MintAddress, TimeMs, VaultId, VaultParams};

        let vault = Vault::create(
            VaultId::new("vault-1"),
            MintAddress::new("MintAAA"),
            UserId::new("creator"),
            Decimal::zero(),
            VaultParams::default(),
            TimeMs::new(0),
        );

        let distribution = distribute_vault_share(&vault, 7_000);
        assert_eq!(distribution.per_owner.len(), 1);
        assert_eq!(distribution.per_owner[0].id, UserId::new("creator"));
        assert_eq!(distribution.per_owner[0].keep, 7_000);
        assert_eq!(distribution.platform, 0);
        assert_exact(7_000, &distribution);

        let nothing = distribute_vault_share(&vault, 0);
        assert_eq!(nothing.platform, 0);
        assert!(nothing.per_owner.is_empty());
    }

    #[test]
    fn test_stakes_from_vault_orders_creator_first() {
        use crate::domain::{MintAddress, TimeMs, VaultId, VaultParams};

        let mut vault = Vault::create(
            VaultId::new("vault-1"),
            MintAddress::new("MintAAA"),
            UserId::new("creator"),
            d("30000"),
            VaultParams::default(),
            TimeMs::new(0),
        );
        vault.deposit(&UserId::new("lp-1"), d("20000"));

        let stakes = stakes_from_vault(&vault);
        assert_eq!(stakes.len(), 2);
        assert_eq!(stakes[0].id, UserId::new("creator"));
        assert_eq!(stakes[0].capital, d("30000"));
        assert_eq!(stakes[1].id, UserId::new("lp-1"));
        assert_eq!(stakes[1].capital, d("20000"));
    }
}
