//! Engine-level errors and their failure classification.
//!
//! Callers mostly care about the [`ErrorKind`]: validation and capacity
//! failures mean nothing moved and the request was simply refused;
//! contention means retry later; reconciliation means money moved
//! partially and the error message says what needs attention.

use crate::domain::{Decimal, MintAddress, PositionId, UserId, VaultId, VaultStatus};
use crate::engine::ValuationError;
use crate::ledger::LedgerError;
use crate::prices::PriceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("insufficient funds for {user}: need {needed}, have {available}")]
    InsufficientFunds {
        user: UserId,
        needed: Decimal,
        available: Decimal,
    },
    #[error("vault {vault} cannot cover borrow of {requested} (available {available})")]
    InsufficientVaultCapital {
        vault: VaultId,
        requested: Decimal,
        available: Decimal,
    },
    #[error("vault {0} not found")]
    VaultNotFound(VaultId),
    #[error("vault {vault} is {status}")]
    VaultNotActive { vault: VaultId, status: VaultStatus },
    #[error("a vault for mint {0} already exists")]
    DuplicateVaultMint(MintAddress),
    #[error("position {0} not found")]
    PositionNotFound(PositionId),
    #[error("position {0} is already closed")]
    PositionAlreadyClosed(PositionId),
    #[error("price unavailable for {0}")]
    PriceUnavailable(String),
    #[error("update on {path} still contended after {attempts} attempts")]
    Contention { path: String, attempts: u32 },
    #[error("reconciliation required: {0}")]
    Reconciliation(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Coarse classification for callers and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request refused before any money moved.
    Validation,
    /// A balance or vault could not cover the amount; nothing moved.
    Capacity,
    /// Too much concurrent traffic on one record; safe to retry.
    Contention,
    /// Money moved partially; the state needs human or job attention.
    Reconciliation,
    /// The backing store failed.
    Store,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_)
            | EngineError::VaultNotFound(_)
            | EngineError::VaultNotActive { .. }
            | EngineError::DuplicateVaultMint(_)
            | EngineError::PositionNotFound(_)
            | EngineError::PositionAlreadyClosed(_)
            | EngineError::PriceUnavailable(_) => ErrorKind::Validation,
            EngineError::InsufficientFunds { .. }
            | EngineError::InsufficientVaultCapital { .. } => ErrorKind::Capacity,
            EngineError::Contention { .. } => ErrorKind::Contention,
            EngineError::Ledger(LedgerError::Contention { .. }) => ErrorKind::Contention,
            EngineError::Reconciliation(_) => ErrorKind::Reconciliation,
            EngineError::Ledger(_) => ErrorKind::Store,
        }
    }
}

impl From<ValuationError> for EngineError {
    fn from(err: ValuationError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

impl From<PriceError> for EngineError {
    fn from(err: PriceError) -> Self {
        EngineError::PriceUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_classify() {
        let err = EngineError::Validation("bad input".to_string());
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = EngineError::InsufficientFunds {
            user: UserId::new("u"),
            needed: Decimal::one(),
            available: Decimal::zero(),
        };
        assert_eq!(err.kind(), ErrorKind::Capacity);

        let err = EngineError::Contention {
            path: "balances/u".to_string(),
            attempts: 6,
        };
        assert_eq!(err.kind(), ErrorKind::Contention);

        let err = EngineError::Ledger(LedgerError::Contention {
            path: "vaults/v".to_string(),
            attempts: 25,
        });
        assert_eq!(err.kind(), ErrorKind::Contention);

        let err = EngineError::Reconciliation("orphaned borrow".to_string());
        assert_eq!(err.kind(), ErrorKind::Reconciliation);
    }

    #[test]
    fn test_capacity_message_names_amounts() {
        let err = EngineError::InsufficientVaultCapital {
            vault: VaultId::new("vault-1"),
            requested: Decimal::from_str_canonical("150").unwrap(),
            available: Decimal::from_str_canonical("100").unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "vault vault-1 cannot cover borrow of 150 (available 100)"
        );
    }
}
