use sidetree_ledger::LedgerError;
use sidetree_protocol::ProtocolError;
use sidetree_types::{Classify, ErrorCode, TypeError};

/// Errors from observer components.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("{0} already started")]
    AlreadyStarted(&'static str),

    #[error("{0} is not running")]
    NotRunning(&'static str),

    /// An anchor record could not be decoded; retrying cannot help.
    #[error("unmarshal error for key {key} at {block}:{tx}: {reason}")]
    Unmarshal {
        key: String,
        block: u64,
        tx: u64,
        reason: String,
    },

    #[error("invalid metadata: {0}")]
    Metadata(String),

    #[error("no document cache for channel {channel} and namespace {namespace}")]
    CacheNotFound { channel: String, namespace: String },

    #[error("document cache already registered for channel {channel} and namespace {namespace}")]
    DuplicateCache { channel: String, namespace: String },

    #[error("document loader failed: {0}")]
    Loader(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl Classify for ObserverError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Ledger(e) => e.code(),
            Self::Protocol(e) => e.code(),
            Self::CacheNotFound { .. } => ErrorCode::NotFound,
            _ => ErrorCode::Unknown,
        }
    }

    fn is_transient(&self) -> bool {
        match self {
            Self::Ledger(e) => e.is_transient(),
            Self::Protocol(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type ObserverResult<T> = Result<T, ObserverError>;
