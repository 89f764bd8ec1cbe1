//! Batch cutting and writing.
//!
//! ```text
//! add(op) ── validate (current version) ──► queue
//!                                             │ peek
//!                       Cutter: full / version boundary / timeout
//!                                             │
//!            batch encoder ──► CAS (chunk, proof, provisional, core)
//!                                             │ anchor string
//!                        ledger.submit("sidetreetxn_<anchor>", record)
//!                                             │ ack
//!                                      queue.remove(count)
//! ```
//!
//! The queue is the source of truth until the ledger acknowledges an
//! anchor, so a crash at any point before the acknowledgement leaves every
//! operation queued for the next attempt.

pub mod cutter;
pub mod error;
pub mod writer;

pub use cutter::{Cut, CutReason, Cutter};
pub use error::{BatchError, BatchResult};
pub use writer::{BatchContext, BatchWriter, BatchWriterConfig};

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use sidetree_crypto::Multihasher;
    use sidetree_ledger::InMemoryLedger;
    use sidetree_protocol::{DocumentType, Protocol, ProtocolClient, VersionFactory};
    use sidetree_queue::MemoryOperationQueue;
    use sidetree_store::{InMemoryCas, InMemoryOperationStore};
    use sidetree_types::{Operation, OperationType};
    use sidetree_v1::{default_protocol, CreateRequest, Delta, Factory, VERSION};

    use crate::writer::{BatchContext, BatchWriter, BatchWriterConfig};

    pub(crate) const NAMESPACE: &str = "did:sidetree";

    fn protocol(genesis_time: u64, max_operation_count: usize) -> Protocol {
        Protocol {
            max_operation_count,
            ..default_protocol(genesis_time)
        }
    }

    /// Protocol client with one v1 version per `(genesis_time, max_operation_count)`.
    pub(crate) fn client(versions: &[(u64, usize)]) -> Arc<ProtocolClient> {
        client_with(
            versions,
            Arc::new(InMemoryCas::new()),
            Arc::new(InMemoryOperationStore::new()),
        )
    }

    fn client_with(
        versions: &[(u64, usize)],
        cas: Arc<InMemoryCas>,
        store: Arc<InMemoryOperationStore>,
    ) -> Arc<ProtocolClient> {
        let versions = versions
            .iter()
            .map(|&(genesis, max)| {
                Factory
                    .create(
                        VERSION,
                        protocol(genesis, max),
                        cas.clone(),
                        store.clone(),
                        DocumentType::DidDocument,
                    )
                    .unwrap()
            })
            .collect();
        Arc::new(ProtocolClient::new(NAMESPACE, versions).unwrap())
    }

    /// An operation whose payload is never parsed.
    pub(crate) fn op(suffix: &str, arrived_at: i64) -> Operation {
        Operation::new(suffix, OperationType::Create, NAMESPACE, b"{}".to_vec())
            .unwrap()
            .with_arrived_at(arrived_at)
    }

    /// A valid create operation, distinct per seed.
    pub(crate) fn create_op(seed: u32) -> Operation {
        let h = Multihasher::SHA2_256;
        let delta = Delta::new(
            h.commitment(&format!("update-{seed}")),
            vec![json!({"action": "replace", "document": {"seed": seed}})],
        );
        let request =
            CreateRequest::new(&h, h.commitment(&format!("recovery-{seed}")), delta).unwrap();
        let suffix = request.unique_suffix(&h).unwrap();
        Operation::new(
            suffix,
            OperationType::Create,
            NAMESPACE,
            serde_json::to_vec(&request).unwrap(),
        )
        .unwrap()
    }

    pub(crate) struct Fixture {
        pub(crate) queue: Arc<MemoryOperationQueue>,
        pub(crate) ledger: Arc<InMemoryLedger>,
        pub(crate) client: Arc<ProtocolClient>,
    }

    impl Fixture {
        pub(crate) fn new(versions: &[(u64, usize)]) -> Self {
            let cas = Arc::new(InMemoryCas::new());
            let store = Arc::new(InMemoryOperationStore::new());
            Self {
                queue: Arc::new(MemoryOperationQueue::new()),
                ledger: Arc::new(InMemoryLedger::new("mychannel").unwrap()),
                client: client_with(versions, cas, store),
            }
        }

        pub(crate) fn writer(&self, config: BatchWriterConfig) -> BatchWriter {
            BatchWriter::new(
                BatchContext {
                    channel: "mychannel".into(),
                    namespace: NAMESPACE.into(),
                    sidetree_chaincode: "sidetreetxn".into(),
                    queue: self.queue.clone(),
                    protocol_client: self.client.clone(),
                    ledger: self.ledger.clone(),
                },
                config,
            )
            .unwrap()
        }
    }
}
