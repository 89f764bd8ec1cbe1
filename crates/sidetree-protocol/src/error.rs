use sidetree_crypto::CryptoError;
use sidetree_store::StoreError;
use sidetree_types::{Classify, ErrorCode, TypeError};

/// Errors from protocol configuration and from the per-version pipeline.
///
/// Classification drives observer retries: only store errors can be
/// transient, everything else is a property of the data or configuration.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid protocol parameter '{field}': {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("protocol version factory [{0}] already registered")]
    DuplicateVersion(String),

    #[error("protocol version factory for version [{0}] not found")]
    UnknownVersion(String),

    #[error("no protocol version for namespace {namespace} at time {time}")]
    NoVersionAt { namespace: String, time: u64 },

    #[error("no protocol version with genesis time {0}")]
    UnknownGenesisTime(u64),

    #[error("namespace not configured: {0}")]
    NamespaceNotConfigured(String),

    #[error("unsupported compression algorithm: {0}")]
    UnsupportedCompression(String),

    #[error("unsupported document type: {0}")]
    UnsupportedDocumentType(String),

    #[error("{what} size {size} exceeds maximum {max}")]
    SizeExceeded {
        what: &'static str,
        size: usize,
        max: usize,
    },

    #[error("operation count mismatch: anchor says {expected}, files hold {actual}")]
    CountMismatch { expected: u64, actual: u64 },

    /// Payload or file content did not have the expected shape.
    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    /// A single operation failed validation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub fn malformed(what: &'static str, reason: impl ToString) -> Self {
        Self::Malformed {
            what,
            reason: reason.to_string(),
        }
    }
}

impl Classify for ProtocolError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Store(e) => e.code(),
            _ => ErrorCode::Unknown,
        }
    }

    fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sidetree_crypto::Cid;

    #[test]
    fn store_errors_keep_their_classification() {
        let err: ProtocolError = StoreError::ContentNotFound(Cid::of(b"x")).into();
        assert!(err.is_transient());
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = ProtocolError::CountMismatch {
            expected: 2,
            actual: 1,
        };
        assert!(!err.is_transient());
        assert_eq!(err.code(), ErrorCode::Unknown);
    }
}
