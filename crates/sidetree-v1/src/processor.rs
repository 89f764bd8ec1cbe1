use std::sync::Arc;

use async_trait::async_trait;
use sidetree_protocol::{OperationProvider, ProtocolResult, TransactionProcessor};
use sidetree_store::OperationStore;
use sidetree_types::SidetreeTxn;
use tracing::info;

use crate::filter::OperationFilter;

/// Hydrates a transaction, filters it against the store and persists the survivors.
pub struct V1TransactionProcessor {
    provider: Arc<dyn OperationProvider>,
    filter: OperationFilter,
    op_store: Arc<dyn OperationStore>,
}

impl V1TransactionProcessor {
    pub fn new(
        provider: Arc<dyn OperationProvider>,
        filter: OperationFilter,
        op_store: Arc<dyn OperationStore>,
    ) -> Self {
        Self {
            provider,
            filter,
            op_store,
        }
    }
}

#[async_trait]
impl TransactionProcessor for V1TransactionProcessor {
    async fn process(&self, txn: &SidetreeTxn) -> ProtocolResult<usize> {
        let ops = self.provider.get_txn_operations(txn).await?;
        let hydrated = ops.len();
        let accepted = self.filter.filter(ops).await?;
        self.op_store.put(&accepted).await?;

        info!(
            namespace = %txn.namespace,
            block = txn.transaction_time,
            tx = txn.transaction_number,
            hydrated,
            accepted = accepted.len(),
            "processed sidetree transaction"
        );
        Ok(accepted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::V1BatchEncoder;
    use crate::model::{Request, UpdateRequest};
    use crate::parser::tests::{create, delta, protocol};
    use crate::parser::OperationParser;
    use crate::provider::V1OperationProvider;
    use sidetree_crypto::Multihasher;
    use sidetree_protocol::{BatchEncoder, ZstdCompressor};
    use sidetree_store::{InMemoryCas, InMemoryOperationStore};
    use sidetree_types::{AnchorString, Operation, QueuedOperation};

    struct Harness {
        encoder: V1BatchEncoder,
        processor: V1TransactionProcessor,
        store: Arc<InMemoryOperationStore>,
    }

    fn harness() -> Harness {
        let cas = Arc::new(InMemoryCas::new());
        let store = Arc::new(InMemoryOperationStore::new());
        let parser = OperationParser::new(protocol(0)).unwrap();
        let compressor = Arc::new(ZstdCompressor);
        let provider = Arc::new(V1OperationProvider::new(
            parser.clone(),
            cas.clone(),
            compressor.clone(),
        ));
        Harness {
            encoder: V1BatchEncoder::new(parser.clone(), cas, compressor),
            processor: V1TransactionProcessor::new(
                provider,
                OperationFilter::new(parser, store.clone()),
                store.clone(),
            ),
            store,
        }
    }

    fn queued(suffix: &str, request: Request) -> QueuedOperation {
        let op = Operation::new(
            suffix,
            request.op_type(),
            "did:sidetree",
            request.to_payload().unwrap(),
        )
        .unwrap();
        QueuedOperation::new(op, 0)
    }

    fn txn(anchor: &AnchorString, block: u64) -> SidetreeTxn {
        SidetreeTxn {
            transaction_time: block,
            transaction_number: 0,
            anchor_string: anchor.to_string(),
            namespace: "did:sidetree".into(),
            protocol_genesis_time: 0,
        }
    }

    #[tokio::test]
    async fn processes_and_stores_surviving_operations() {
        let h = Multihasher::SHA2_256;
        let hs = harness();
        let c = create("u1", "r1");
        let suffix = c.unique_suffix(&h).unwrap();

        let first = hs
            .encoder
            .write_batch(&[queued(&suffix, Request::Create(c.clone()))])
            .await
            .unwrap();
        assert_eq!(hs.processor.process(&txn(&first, 3)).await.unwrap(), 1);

        // Second batch: one good update and a replayed create.
        let update = UpdateRequest::new(&h, &suffix, "u1", delta("u2")).unwrap();
        let second = hs
            .encoder
            .write_batch(&[
                queued(&suffix, Request::Update(update)),
                queued(&suffix, Request::Create(c)),
            ])
            .await
            .unwrap();
        assert_eq!(hs.processor.process(&txn(&second, 4)).await.unwrap(), 1);

        let stored = hs.store.get(&suffix).await.unwrap();
        let keys: Vec<_> = stored.iter().map(|o| o.ordering_key()).collect();
        assert_eq!(keys, vec![(3, 0, 0), (4, 0, 0)]);
    }

    #[tokio::test]
    async fn reprocessing_is_idempotent() {
        let h = Multihasher::SHA2_256;
        let hs = harness();
        let c = create("u1", "r1");
        let suffix = c.unique_suffix(&h).unwrap();
        let anchor = hs
            .encoder
            .write_batch(&[queued(&suffix, Request::Create(c))])
            .await
            .unwrap();

        assert_eq!(hs.processor.process(&txn(&anchor, 3)).await.unwrap(), 1);
        assert_eq!(hs.processor.process(&txn(&anchor, 3)).await.unwrap(), 1);
        assert_eq!(hs.store.len(), 1);
    }
}
