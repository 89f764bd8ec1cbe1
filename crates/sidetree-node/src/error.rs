use std::path::PathBuf;

use sidetree_batch::BatchError;
use sidetree_ledger::LedgerError;
use sidetree_observer::ObserverError;
use sidetree_protocol::ProtocolError;
use sidetree_queue::QueueError;
use sidetree_store::StoreError;
use sidetree_types::{Classify, ErrorCode};

/// Problems with the node configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from node wiring and lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("channel {0} is not configured")]
    UnknownChannel(String),

    #[error("channel {0} is already running")]
    ChannelRunning(String),

    #[error("namespace {namespace} is not served on channel {channel}")]
    UnknownNamespace { channel: String, namespace: String },

    #[error("this peer does not have the {0} role")]
    MissingRole(&'static str),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Observer(#[from] ObserverError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Classify for NodeError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Batch(e) => e.code(),
            Self::Observer(e) => e.code(),
            Self::Protocol(e) => e.code(),
            Self::Queue(e) => e.code(),
            Self::Ledger(e) => e.code(),
            Self::Store(e) => e.code(),
            _ => ErrorCode::Unknown,
        }
    }

    fn is_transient(&self) -> bool {
        match self {
            Self::Batch(e) => e.is_transient(),
            Self::Observer(e) => e.is_transient(),
            Self::Protocol(e) => e.is_transient(),
            Self::Queue(e) => e.is_transient(),
            Self::Ledger(e) => e.is_transient(),
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type NodeResult<T> = Result<T, NodeError>;
