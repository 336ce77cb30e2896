pub mod accounting;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod orchestration;
pub mod prices;

pub use accounting::{BalanceTransactor, PlatformTreasury, VaultCapitalManager};
pub use config::EngineConfig;
pub use domain::{
    Clock, Decimal, FixedClock, MintAddress, Position, PositionId, PositionStatus, SystemClock,
    TimeMs, UserId, Vault, VaultId, VaultParams, VaultStatus,
};
pub use error::{EngineError, ErrorKind};
pub use ledger::{init_ledger_db, LedgerStore, MemoryLedger, SqliteLedger};
pub use orchestration::{
    CloseReceipt, CloseRequest, CreateVaultReceipt, CreateVaultRequest, OpenReceipt, OpenRequest,
    PositionLifecycle,
};
pub use prices::{PriceSource, StaticPriceSource};
