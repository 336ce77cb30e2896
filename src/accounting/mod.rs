//! Money movement against the ledger: user balances, vault capital,
//! and the platform treasury. Everything here goes through per-record
//! CAS; cross-record consistency is the orchestration layer's problem.

pub mod balance;
pub mod treasury;
pub mod vault_manager;

pub use balance::{BalanceTransactor, BalanceUpdate};
pub use treasury::PlatformTreasury;
pub use vault_manager::VaultCapitalManager;
