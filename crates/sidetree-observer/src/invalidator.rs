use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use sidetree_protocol::Version;
use sidetree_types::{ObserverMetadata, SidetreeTxn};
use tracing::debug;

use crate::cache::DocumentCacheRegistry;
use crate::error::{ObserverError, ObserverResult};
use crate::metadata::{InMemoryMetadataStore, MetadataStore};
use crate::processor::Behavior;

/// Marks cached documents stale as new anchors touch them.
///
/// Every peer runs its own invalidator, so there is no lease and progress
/// lives in memory: a restarted peer starts over from the block it is
/// given, which is normally the current tip.
pub struct InvalidatorBehavior {
    channel: String,
    caches: Arc<DocumentCacheRegistry>,
    metadata: InMemoryMetadataStore,
}

impl InvalidatorBehavior {
    pub fn new(
        channel: impl Into<String>,
        caches: Arc<DocumentCacheRegistry>,
        last_block_processed: u64,
    ) -> Self {
        Self {
            channel: channel.into(),
            caches,
            metadata: InMemoryMetadataStore::with(ObserverMetadata::new("", last_block_processed)),
        }
    }
}

#[async_trait]
impl Behavior for InvalidatorBehavior {
    fn kind(&self) -> &'static str {
        "invalidator"
    }

    async fn begin_round(&self) -> ObserverResult<Option<ObserverMetadata>> {
        self.metadata.get().await
    }

    async fn save_metadata(&self, metadata: &ObserverMetadata) -> ObserverResult<()> {
        self.metadata.put(metadata).await
    }

    fn next_lease_owner(&self, _block: u64) -> Option<String> {
        None
    }

    async fn process_txn(&self, txn: &SidetreeTxn, version: &Version) -> ObserverResult<()> {
        let cache = match self.caches.get(&self.channel, &txn.namespace) {
            Ok(cache) => cache,
            Err(ObserverError::CacheNotFound { .. }) => {
                debug!(
                    channel = %self.channel,
                    namespace = %txn.namespace,
                    "no document cache, nothing to invalidate"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let ops = version.operation_provider().get_txn_operations(txn).await?;
        let suffixes: BTreeSet<&str> = ops.iter().map(|op| op.unique_suffix.as_str()).collect();
        for suffix in &suffixes {
            cache.invalidate(suffix);
        }
        debug!(
            channel = %self.channel,
            namespace = %txn.namespace,
            block = txn.transaction_time,
            tx = txn.transaction_number,
            documents = suffixes.len(),
            "invalidated documents"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DocumentCache, DocumentLoader};
    use crate::processor::{BlockProcessor, ProcessorConfig};
    use crate::tests::{anchor_batch, clients, create_op, memory_clients, CHAINCODE, NAMESPACE};
    use serde_json::{json, Value};
    use sidetree_ledger::{InMemoryLedger, KvWrite};
    use sidetree_store::{InMemoryCas, InMemoryOperationStore};

    struct Fixed;

    #[async_trait]
    impl DocumentLoader for Fixed {
        async fn load(&self, unique_suffix: &str) -> ObserverResult<Option<Value>> {
            Ok(Some(json!({"id": unique_suffix})))
        }
    }

    #[tokio::test]
    async fn anchored_suffixes_become_stale() {
        let ledger = Arc::new(InMemoryLedger::new("mychannel").unwrap());
        let store = Arc::new(InMemoryOperationStore::new());
        let clients = clients(Arc::new(InMemoryCas::new()), store.clone());

        let (touched, untouched) = (create_op(1), create_op(2));
        let cache = Arc::new(DocumentCache::new("mychannel", NAMESPACE, 0, Arc::new(Fixed)));
        cache.resolve(touched.unique_suffix()).await.unwrap();
        cache.resolve(untouched.unique_suffix()).await.unwrap();
        let registry = Arc::new(DocumentCacheRegistry::new());
        registry.register("mychannel", cache.clone()).unwrap();

        // Already on the ledger before the invalidator starts: ignored.
        let (key, value) = anchor_batch(&clients, &[untouched.clone()]).await;
        ledger.commit_block(vec![vec![KvWrite::put(CHAINCODE, key, value)]]).unwrap();
        let start = 1;

        let (key, value) = anchor_batch(&clients, &[touched.clone()]).await;
        ledger.commit_block(vec![vec![KvWrite::put(CHAINCODE, key, value)]]).unwrap();

        let p = BlockProcessor::new(
            ProcessorConfig::new("mychannel", CHAINCODE),
            ledger,
            clients,
            InvalidatorBehavior::new("mychannel", registry, start),
        );
        p.process_blockchain().await.unwrap();

        assert_eq!(cache.is_stale(touched.unique_suffix()), Some(true));
        assert_eq!(cache.is_stale(untouched.unique_suffix()), Some(false));
        // The invalidator never writes the operation store.
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn missing_cache_is_not_an_error() {
        let ledger = Arc::new(InMemoryLedger::new("mychannel").unwrap());
        let clients = memory_clients();
        let (key, value) = anchor_batch(&clients, &[create_op(1)]).await;
        ledger.commit_block(vec![vec![KvWrite::put(CHAINCODE, key, value)]]).unwrap();

        let p = BlockProcessor::new(
            ProcessorConfig::new("mychannel", CHAINCODE),
            ledger,
            clients,
            InvalidatorBehavior::new("mychannel", Arc::new(DocumentCacheRegistry::new()), 0),
        );
        p.process_blockchain().await.unwrap();
        let md = p.behavior().metadata.get().await.unwrap().unwrap();
        assert_eq!(md.last_block_processed, 1);
    }
}
