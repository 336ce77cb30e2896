pub mod coerce;
pub mod decimal;
pub mod position;
pub mod primitives;
pub mod records;
pub mod vault;

pub use decimal::{Decimal, LAMPORTS_PER_SOL};
pub use position::{Position, PositionSide, PositionStatus};
pub use primitives::{
    Clock, FixedClock, MintAddress, PositionId, SystemClock, TimeMs, UserId, VaultId, SOL_ASSET_ID,
};
pub use records::{FeeEvent, FeeRecord, OwnerCredit, RecordStatus, TradeKind, TradeRecord};
pub use vault::{Contributor, Vault, VaultComposition, VaultParams, VaultStatus};
