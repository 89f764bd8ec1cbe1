//! Stub function objects shared by this crate's tests.

use std::sync::Arc;

use async_trait::async_trait;
use sidetree_store::{Cas, InMemoryCas, InMemoryOperationStore, OperationStore};
use sidetree_types::{AnchorString, AnchoredOperation, Operation, QueuedOperation, SidetreeTxn};

use crate::compression::NoopCompressor;
use crate::error::ProtocolResult;
use crate::params::Protocol;
use crate::registry::VersionFactory;
use crate::version::{
    BatchEncoder, DocumentType, OperationProvider, OperationValidator, TransactionProcessor,
    Version,
};

pub(crate) struct Stub;

#[async_trait]
impl TransactionProcessor for Stub {
    async fn process(&self, _txn: &SidetreeTxn) -> ProtocolResult<usize> {
        Ok(0)
    }
}

#[async_trait]
impl OperationProvider for Stub {
    async fn get_txn_operations(
        &self,
        _txn: &SidetreeTxn,
    ) -> ProtocolResult<Vec<AnchoredOperation>> {
        Ok(Vec::new())
    }
}

impl OperationValidator for Stub {
    fn validate(&self, _op: &Operation) -> ProtocolResult<()> {
        Ok(())
    }
}

#[async_trait]
impl BatchEncoder for Stub {
    async fn write_batch(&self, ops: &[QueuedOperation]) -> ProtocolResult<AnchorString> {
        Ok(AnchorString::new(ops.len() as u64, "stub"))
    }
}

pub(crate) struct StubFactory;

impl VersionFactory for StubFactory {
    fn create(
        &self,
        version: &str,
        protocol: Protocol,
        _cas: Arc<dyn Cas>,
        _op_store: Arc<dyn OperationStore>,
        doc_type: DocumentType,
    ) -> ProtocolResult<Version> {
        let stub = Arc::new(Stub);
        Ok(Version::new(
            version,
            protocol,
            doc_type,
            stub.clone(),
            stub.clone(),
            stub.clone(),
            Arc::new(NoopCompressor),
            stub,
        ))
    }
}

pub(crate) fn stub_stores() -> (Arc<dyn Cas>, Arc<dyn OperationStore>) {
    (
        Arc::new(InMemoryCas::new()),
        Arc::new(InMemoryOperationStore::new()),
    )
}
