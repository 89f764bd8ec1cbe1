use sidetree_types::{Classify, ErrorCode};

/// Errors produced by ledger gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The ledger (or the peer serving it) cannot be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("block {number} not found (height {height})")]
    BlockNotFound { number: u64, height: u64 },

    #[error("block not found for hash {0}")]
    BlockHashNotFound(String),

    /// The ledger refused the transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("invalid write: {0}")]
    InvalidWrite(String),

    #[error("off-ledger store error: {0}")]
    OffLedger(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Classify for LedgerError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Unavailable(_) | Self::BlockNotFound { .. } | Self::BlockHashNotFound(_) => {
                ErrorCode::Blockchain
            }
            Self::OffLedger(_) => ErrorCode::Db,
            _ => ErrorCode::Unknown,
        }
    }

    fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_)
                | Self::BlockNotFound { .. }
                | Self::BlockHashNotFound(_)
                | Self::OffLedger(_)
        )
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
