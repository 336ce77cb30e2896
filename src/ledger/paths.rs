use crate::domain::{MintAddress, PositionId, UserId, VaultId};

/// A user's settlement-asset balance, stored as a canonical decimal string.
pub fn balance(user_id: &UserId) -> String {
    format!("balances/{}", user_id)
}

/// A vault record.
pub fn vault(vault_id: &VaultId) -> String {
    format!("vaults/{}", vault_id)
}

/// Mint-to-vault uniqueness index: holds the vault id owning the mint.
pub fn vault_mint_index(mint: &MintAddress) -> String {
    format!("vault_index/mints/{}", mint)
}

/// A position record, grouped under its owner.
pub fn position(user_id: &UserId, position_id: &PositionId) -> String {
    format!("positions/{}/{}", user_id, position_id)
}

/// One entry in a user's trade feed.
pub fn trade(user_id: &UserId, record_id: &str) -> String {
    format!("trades/{}/{}", user_id, record_id)
}

/// One entry in a vault's fee history.
pub fn fee_record(vault_id: &VaultId, record_id: &str) -> String {
    format!("fees/{}/{}", vault_id, record_id)
}

/// The platform's accumulated fee lamports.
pub fn platform_treasury() -> String {
    "treasury/platform".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_stable() {
        let user = UserId::new("user-1");
        let vault_id = VaultId::new("vault-1");
        let position_id = PositionId::new("pos-1");
        let mint = MintAddress::new("MintAAA");

        assert_eq!(balance(&user), "balances/user-1");
        assert_eq!(vault(&vault_id), "vaults/vault-1");
        assert_eq!(vault_mint_index(&mint), "vault_index/mints/MintAAA");
        assert_eq!(position(&user, &position_id), "positions/user-1/pos-1");
        assert_eq!(trade(&user, "pos-1:open"), "trades/user-1/pos-1:open");
        assert_eq!(
            fee_record(&vault_id, "pos-1:open"),
            "fees/vault-1/pos-1:open"
        );
        assert_eq!(platform_treasury(), "treasury/platform");
    }
}
