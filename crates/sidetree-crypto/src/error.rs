/// Errors from hashing and encoding operations.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("unsupported multihash algorithm: {0}")]
    UnsupportedAlgorithm(u64),

    #[error("invalid encoding: {0}")]
    Encoding(String),

    #[error("malformed multihash: {0}")]
    MalformedMultihash(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
