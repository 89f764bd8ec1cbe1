use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sidetree_types::{AnchorString, AnchoredOperation, Operation, QueuedOperation, SidetreeTxn};

use crate::compression::Compressor;
use crate::error::{ProtocolError, ProtocolResult};
use crate::params::Protocol;

/// Kind of document a namespace resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    DidDocument,
    FileIndex,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DidDocument => "did-document",
            Self::FileIndex => "file-index",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "did-document" => Ok(Self::DidDocument),
            "file-index" => Ok(Self::FileIndex),
            other => Err(ProtocolError::UnsupportedDocumentType(other.to_string())),
        }
    }
}

/// Applies one anchored batch to the operation store.
#[async_trait]
pub trait TransactionProcessor: Send + Sync {
    /// Returns the number of operations stored.
    async fn process(&self, txn: &SidetreeTxn) -> ProtocolResult<usize>;
}

/// Expands an anchor into the operations it carries.
#[async_trait]
pub trait OperationProvider: Send + Sync {
    /// Operations of `txn`, attributed to its ledger position, in batch order.
    async fn get_txn_operations(&self, txn: &SidetreeTxn) -> ProtocolResult<Vec<AnchoredOperation>>;
}

/// Front-door check applied before an operation is queued.
pub trait OperationValidator: Send + Sync {
    fn validate(&self, op: &Operation) -> ProtocolResult<()>;
}

/// Writes a batch's file set to CAS and returns the anchor string.
#[async_trait]
pub trait BatchEncoder: Send + Sync {
    async fn write_batch(&self, ops: &[QueuedOperation]) -> ProtocolResult<AnchorString>;
}

/// A runtime protocol version: parameters plus the function objects built
/// from them.
#[derive(Clone)]
pub struct Version {
    version: String,
    protocol: Protocol,
    document_type: DocumentType,
    transaction_processor: Arc<dyn TransactionProcessor>,
    operation_provider: Arc<dyn OperationProvider>,
    operation_validator: Arc<dyn OperationValidator>,
    compressor: Arc<dyn Compressor>,
    batch_encoder: Arc<dyn BatchEncoder>,
}

impl Version {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: impl Into<String>,
        protocol: Protocol,
        document_type: DocumentType,
        transaction_processor: Arc<dyn TransactionProcessor>,
        operation_provider: Arc<dyn OperationProvider>,
        operation_validator: Arc<dyn OperationValidator>,
        compressor: Arc<dyn Compressor>,
        batch_encoder: Arc<dyn BatchEncoder>,
    ) -> Self {
        Self {
            version: version.into(),
            protocol,
            document_type,
            transaction_processor,
            operation_provider,
            operation_validator,
            compressor,
            batch_encoder,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn genesis_time(&self) -> u64 {
        self.protocol.genesis_time
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn transaction_processor(&self) -> &Arc<dyn TransactionProcessor> {
        &self.transaction_processor
    }

    pub fn operation_provider(&self) -> &Arc<dyn OperationProvider> {
        &self.operation_provider
    }

    pub fn operation_validator(&self) -> &Arc<dyn OperationValidator> {
        &self.operation_validator
    }

    pub fn compressor(&self) -> &Arc<dyn Compressor> {
        &self.compressor
    }

    pub fn batch_encoder(&self) -> &Arc<dyn BatchEncoder> {
        &self.batch_encoder
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Version")
            .field("version", &self.version)
            .field("genesis_time", &self.protocol.genesis_time)
            .field("document_type", &self.document_type)
            .field("compression", &self.compressor.algorithm())
            .finish()
    }
}
