use sidetree_crypto::Cid;
use sidetree_types::{Classify, ErrorCode};

/// Errors from CAS and operation store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested content is not (yet) in the CAS.
    #[error("content not found: {0}")]
    ContentNotFound(Cid),

    /// No operations are stored for the unique suffix.
    #[error("unique suffix not found in the store: {0}")]
    SuffixNotFound(String),

    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Content exceeded the caller's size limit.
    #[error("content size {size} exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },

    /// Stored content does not hash to its CID.
    #[error("corrupt content {cid}: {reason}")]
    Corrupt { cid: Cid, reason: String },

    /// A key could not be derived or decoded.
    #[error("malformed key: {0}")]
    InvalidKey(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl Classify for StoreError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::ContentNotFound(_) | Self::SuffixNotFound(_) => ErrorCode::NotFound,
            Self::Unavailable(_) | Self::Io(_) => ErrorCode::Cas,
            Self::Database(_) => ErrorCode::Db,
            _ => ErrorCode::Unknown,
        }
    }

    fn is_transient(&self) -> bool {
        // Content may not have replicated to this peer yet.
        matches!(
            self,
            Self::ContentNotFound(_) | Self::Unavailable(_) | Self::Io(_) | Self::Database(_)
        )
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let missing = StoreError::ContentNotFound(Cid::of(b"x"));
        assert!(missing.is_transient());
        assert_eq!(missing.code(), ErrorCode::NotFound);

        let down = StoreError::Unavailable("connection refused".into());
        assert!(down.is_transient());
        assert_eq!(down.code(), ErrorCode::Cas);

        let big = StoreError::TooLarge { size: 10, max: 5 };
        assert!(!big.is_transient());

        let key = StoreError::InvalidKey("bad".into());
        assert!(!key.is_transient());
        assert_eq!(key.code(), ErrorCode::Unknown);
    }
}
