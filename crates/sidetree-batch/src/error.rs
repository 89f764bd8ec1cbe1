use sidetree_ledger::LedgerError;
use sidetree_protocol::ProtocolError;
use sidetree_queue::QueueError;
use sidetree_types::{Classify, ErrorCode, TypeError};

/// Errors from the batch writer.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("batch writer already started")]
    AlreadyStarted,

    #[error("batch writer is not running")]
    NotRunning,

    #[error("invalid batch writer configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl BatchError {
    /// The batch itself is bad; retrying it cannot succeed.
    pub fn is_batch_rejection(&self) -> bool {
        matches!(
            self,
            Self::Protocol(
                ProtocolError::InvalidOperation(_)
                    | ProtocolError::SizeExceeded { .. }
                    | ProtocolError::Malformed { .. }
            )
        )
    }
}

impl Classify for BatchError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Queue(e) => e.code(),
            Self::Protocol(e) => e.code(),
            Self::Ledger(e) => e.code(),
            _ => ErrorCode::Unknown,
        }
    }

    fn is_transient(&self) -> bool {
        match self {
            Self::Queue(e) => e.is_transient(),
            Self::Protocol(e) => e.is_transient(),
            Self::Ledger(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type BatchResult<T> = Result<T, BatchError>;
