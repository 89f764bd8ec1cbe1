use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unique suffix must not be empty")]
    EmptySuffix,

    #[error("invalid anchor string [{0}]: {1}")]
    InvalidAnchorString(String, &'static str),

    #[error("anchor string length {actual} exceeds maximum {max}")]
    AnchorStringTooLong { actual: usize, max: usize },

    #[error("unknown operation type: {0}")]
    UnknownOperationType(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Enumerated error code carried by every error the pipeline creates.
///
/// The observer persists the code of the last transient failure in its
/// metadata and compares it across rounds to count repeated attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Unspecified failure.
    Unknown,
    /// An item was not found.
    NotFound,
    /// Committing to, or reading from, the ledger failed.
    Blockchain,
    /// The operation store or metadata store was unavailable.
    Db,
    /// The content-addressed store was unavailable.
    Cas,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::NotFound => "NOT_FOUND",
            Self::Blockchain => "BLOCKCHAIN",
            Self::Db => "DB",
            Self::Cas => "CAS",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry classification implemented by every error type in the workspace.
///
/// Only the code and the transient flag cross component boundaries; callers
/// never match on the inner error type to decide whether to retry.
pub trait Classify {
    /// The enumerated code for this error.
    fn code(&self) -> ErrorCode;

    /// `true` if retrying the same work may succeed.
    fn is_transient(&self) -> bool;
}

impl Classify for TypeError {
    fn code(&self) -> ErrorCode {
        ErrorCode::Unknown
    }

    fn is_transient(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::NotFound).unwrap();
        assert_eq!(json, "\"NOT_FOUND\"");
        let parsed: ErrorCode = serde_json::from_str("\"DB\"").unwrap();
        assert_eq!(parsed, ErrorCode::Db);
    }

    #[test]
    fn display_matches_wire_form() {
        assert_eq!(ErrorCode::Blockchain.to_string(), "BLOCKCHAIN");
        assert_eq!(ErrorCode::Cas.to_string(), "CAS");
    }

    #[test]
    fn type_errors_are_persistent() {
        let err = TypeError::EmptySuffix;
        assert!(!err.is_transient());
        assert_eq!(err.code(), ErrorCode::Unknown);
    }
}
