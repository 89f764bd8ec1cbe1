use sidetree_types::{Classify, ErrorCode};

/// Errors from queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error("queue must be closed before it is dropped")]
    NotClosed,

    /// A stored key is not an 8-byte big-endian slot number.
    #[error("corrupt queue key: {0:?}")]
    CorruptKey(Vec<u8>),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl Classify for QueueError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Io(_) | Self::Database(_) => ErrorCode::Db,
            _ => ErrorCode::Unknown,
        }
    }

    fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Database(_))
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
