use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sidetree_ledger::{Block, KvWrite, Ledger, Transaction};
use sidetree_protocol::{ProtocolClientProvider, ProtocolError, Version};
use sidetree_types::{AnchorRecord, Classify, ObserverMetadata, SidetreeTxn, ANCHOR_PREFIX};
use tracing::{debug, error, info, warn};

use crate::error::{ObserverError, ObserverResult};

/// Attempts at one failing transaction before it is skipped.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What a [`BlockProcessor`] does with the anchors it finds, and where it
/// keeps its progress.
#[async_trait]
pub trait Behavior: Send + Sync {
    /// Short name used in logs.
    fn kind(&self) -> &'static str;

    /// Metadata to resume from. `None` skips the round.
    async fn begin_round(&self) -> ObserverResult<Option<ObserverMetadata>>;

    async fn save_metadata(&self, metadata: &ObserverMetadata) -> ObserverResult<()>;

    /// Lease owner for `block`, recorded when a round completes. `None`
    /// when the behaviour has no lease.
    fn next_lease_owner(&self, block: u64) -> Option<String>;

    async fn process_txn(&self, txn: &SidetreeTxn, version: &Version) -> ObserverResult<()>;
}

/// Settings shared by every processor on a channel.
#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    pub channel: String,
    /// Chaincode namespace anchor writes are made under.
    pub sidetree_chaincode: String,
    pub max_attempts: u32,
}

impl ProcessorConfig {
    pub fn new(channel: impl Into<String>, sidetree_chaincode: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            sidetree_chaincode: sidetree_chaincode.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Scans committed blocks for anchor writes and hands each one to a
/// [`Behavior`].
///
/// A round visits every block from the resume point up to `height - 1` in
/// numeric order and stores metadata after each block, so a crash costs at
/// most one block of rework. Transient failures stop the round and the
/// failed block is revisited on the next one, resuming at the failed
/// transaction; after `max_attempts` failures of the same kind at the same
/// transaction it is skipped.
pub struct BlockProcessor<B> {
    config: ProcessorConfig,
    ledger: Arc<dyn Ledger>,
    clients: Arc<ProtocolClientProvider>,
    behavior: B,
    running: AtomicBool,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<B: Behavior> BlockProcessor<B> {
    pub fn new(
        config: ProcessorConfig,
        ledger: Arc<dyn Ledger>,
        clients: Arc<ProtocolClientProvider>,
        behavior: B,
    ) -> Self {
        Self {
            config,
            ledger,
            clients,
            behavior,
            running: AtomicBool::new(false),
        }
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    /// Whether a round is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one round. Returns immediately if a round is already running.
    pub async fn process_blockchain(&self) -> ObserverResult<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(
                channel = %self.config.channel,
                kind = self.behavior.kind(),
                "round already running"
            );
            return Ok(());
        }
        let _guard = RunningGuard(&self.running);

        let height = self.ledger.height().await?;
        let Some(mut metadata) = self.behavior.begin_round().await? else {
            return Ok(());
        };
        if height == 0 {
            return Ok(());
        }
        let to = height - 1;

        let from = metadata.resume_block();
        if let Some(code) = metadata.last_error_code {
            info!(
                channel = %self.config.channel,
                kind = self.behavior.kind(),
                block = metadata.last_block_processed,
                tx = metadata.last_tx_num_processed,
                code = code.as_str(),
                attempt = metadata.failed_attempts + 1,
                "reprocessing block after failure"
            );
        } else {
            metadata.last_tx_num_processed = -1;
        }

        if from > to {
            debug!(
                channel = %self.config.channel,
                kind = self.behavior.kind(),
                last_block = metadata.last_block_processed,
                "no blocks to process"
            );
            return Ok(());
        }
        debug!(
            channel = %self.config.channel,
            kind = self.behavior.kind(),
            from,
            to,
            "processing blocks"
        );

        for number in from..=to {
            let result = self.process_block(number, number == to, &mut metadata).await;
            self.behavior.save_metadata(&metadata).await?;
            if let Err(e) = result {
                error!(
                    channel = %self.config.channel,
                    kind = self.behavior.kind(),
                    block = number,
                    error = %e,
                    "error processing block"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    async fn process_block(
        &self,
        number: u64,
        last: bool,
        metadata: &mut ObserverMetadata,
    ) -> ObserverResult<()> {
        let block = self.ledger.block_by_number(number).await?;
        debug!(
            channel = %self.config.channel,
            block = number,
            txs = block.transactions.len(),
            "visiting block"
        );

        for tx in &block.transactions {
            for write in &tx.writes {
                if let Err(e) = self.handle_write(&block, tx, write, metadata).await {
                    self.handle_error(e, number, tx.tx_num, metadata)?;
                }
            }
        }

        if last {
            if let Some(owner) = self.behavior.next_lease_owner(number + 1) {
                debug!(
                    channel = %self.config.channel,
                    block = number + 1,
                    owner = %owner,
                    "lease owner for next block"
                );
                metadata.lease_owner = owner;
            }
        }
        metadata.complete_block(number);
        Ok(())
    }

    async fn handle_write(
        &self,
        block: &Block,
        tx: &Transaction,
        write: &KvWrite,
        metadata: &mut ObserverMetadata,
    ) -> ObserverResult<()> {
        if (tx.tx_num as i64) < metadata.last_tx_num_processed {
            debug!(
                channel = %self.config.channel,
                block = block.number,
                tx = tx.tx_num,
                key = %write.key,
                "already processed"
            );
            return Ok(());
        }
        metadata.last_block_processed = block.number;
        metadata.last_tx_num_processed = tx.tx_num as i64;

        if !self.is_anchor(write) {
            return Ok(());
        }

        let record = AnchorRecord::from_json(&write.value).map_err(|e| ObserverError::Unmarshal {
            key: write.key.clone(),
            block: block.number,
            tx: tx.tx_num,
            reason: e.to_string(),
        })?;
        let txn = SidetreeTxn::from_record(record, block.number, tx.tx_num);
        debug!(
            channel = %self.config.channel,
            namespace = %txn.namespace,
            block = block.number,
            tx = tx.tx_num,
            anchor = %txn.anchor_string,
            attempt = metadata.failed_attempts + 1,
            "handling anchor"
        );

        let version = self.version_for(&txn)?;
        self.behavior.process_txn(&txn, &version).await
    }

    fn is_anchor(&self, write: &KvWrite) -> bool {
        write.namespace == self.config.sidetree_chaincode
            && write.collection.is_none()
            && !write.is_delete
            && write.key.starts_with(ANCHOR_PREFIX)
    }

    /// The version named by the anchor record, which must already be in
    /// effect at the anchoring block.
    fn version_for(&self, txn: &SidetreeTxn) -> ObserverResult<Arc<Version>> {
        let client = self.clients.for_namespace(&txn.namespace)?;
        let version = client.get_by_genesis(txn.protocol_genesis_time)?;
        if version.genesis_time() > txn.transaction_time {
            return Err(ProtocolError::NoVersionAt {
                namespace: txn.namespace.clone(),
                time: txn.transaction_time,
            }
            .into());
        }
        Ok(version)
    }

    /// `Ok` to carry on with the block, `Err` to stop the round.
    fn handle_error(
        &self,
        err: ObserverError,
        block: u64,
        tx: u64,
        metadata: &mut ObserverMetadata,
    ) -> ObserverResult<()> {
        if !err.is_transient() {
            error!(
                channel = %self.config.channel,
                block,
                tx,
                error = %err,
                "ignoring persistent error"
            );
            metadata.clear_error();
            return Ok(());
        }

        let code = err.code();
        if metadata.last_error_code == Some(code) && metadata.last_tx_num_processed == tx as i64 {
            metadata.failed_attempts += 1;
            if metadata.failed_attempts > self.config.max_attempts {
                error!(
                    channel = %self.config.channel,
                    block,
                    tx,
                    attempts = metadata.failed_attempts,
                    error = %err,
                    "giving up on transaction"
                );
                metadata.clear_error();
                return Ok(());
            }
            warn!(
                channel = %self.config.channel,
                block,
                tx,
                code = code.as_str(),
                attempts = metadata.failed_attempts,
                error = %err,
                "same error as before"
            );
        } else {
            metadata.failed_attempts = 1;
            warn!(
                channel = %self.config.channel,
                block,
                tx,
                code = code.as_str(),
                error = %err,
                "new error processing transaction"
            );
        }
        metadata.last_error_code = Some(code);
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataStore;
    use crate::tests::{
        anchor_batch, clients, create_op, memory_clients, Recording, CHAINCODE, NAMESPACE,
    };
    use sidetree_ledger::InMemoryLedger;
    use sidetree_store::{InMemoryCas, InMemoryOperationStore, OperationStore};
    use sidetree_types::ErrorCode;

    fn processor(
        ledger: &Arc<InMemoryLedger>,
        clients: Arc<ProtocolClientProvider>,
    ) -> BlockProcessor<Recording> {
        BlockProcessor::new(
            ProcessorConfig::new("mychannel", CHAINCODE),
            ledger.clone(),
            clients,
            Recording::starting_at(0),
        )
    }

    // ----------------------------------------------------------------
    // Filtering
    // ----------------------------------------------------------------

    #[tokio::test]
    async fn only_anchor_writes_are_processed() {
        let ledger = Arc::new(InMemoryLedger::new("mychannel").unwrap());
        let cas = Arc::new(InMemoryCas::new());
        let store = Arc::new(InMemoryOperationStore::new());
        let clients = clients(cas.clone(), store.clone());
        let (key, value) = anchor_batch(&clients, &[create_op(1)]).await;

        ledger
            .commit_block(vec![
                vec![KvWrite::put("othercc", key.clone(), value.clone())],
                vec![KvWrite::delete(CHAINCODE, key.clone())],
                vec![KvWrite::put(CHAINCODE, "unrelated", b"x".to_vec())],
                vec![KvWrite::put(CHAINCODE, key, value)],
            ])
            .unwrap();

        let p = processor(&ledger, clients);
        p.process_blockchain().await.unwrap();
        assert_eq!(*p.behavior().seen.lock(), vec![(1, 3)]);

        let md = p.behavior().store.get().await.unwrap().unwrap();
        assert_eq!(md.last_block_processed, 1);
        assert_eq!(md.last_tx_num_processed, -1);
        assert!(!p.is_running());
    }

    #[tokio::test]
    async fn unmarshal_error_is_skipped() {
        let ledger = Arc::new(InMemoryLedger::new("mychannel").unwrap());
        let clients = memory_clients();
        ledger
            .commit_block(vec![vec![KvWrite::put(
                CHAINCODE,
                format!("{ANCHOR_PREFIX}1.x"),
                b"{".to_vec(),
            )]])
            .unwrap();

        let p = processor(&ledger, clients);
        p.process_blockchain().await.unwrap();
        let md = p.behavior().store.get().await.unwrap().unwrap();
        assert_eq!(md.last_block_processed, 1);
        assert_eq!(md.last_error_code, None);
        assert!(p.behavior().seen.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_namespace_is_persistent() {
        let ledger = Arc::new(InMemoryLedger::new("mychannel").unwrap());
        let clients = memory_clients();
        let record = AnchorRecord {
            anchor_string: "1.bafkreigh2akiscaildc".into(),
            namespace: "did:other".into(),
            protocol_genesis_time: 0,
        };
        ledger
            .commit_block(vec![vec![KvWrite::put(
                CHAINCODE,
                format!("{ANCHOR_PREFIX}{}", record.anchor_string),
                record.to_json().unwrap(),
            )]])
            .unwrap();

        let p = processor(&ledger, clients);
        p.process_blockchain().await.unwrap();
        assert_eq!(p.behavior().store.get().await.unwrap().unwrap().last_block_processed, 1);
    }

    // ----------------------------------------------------------------
    // Ordering and retries
    // ----------------------------------------------------------------

    #[tokio::test]
    async fn blocks_are_visited_in_numeric_order() {
        let ledger = Arc::new(InMemoryLedger::new("mychannel").unwrap());
        let cas = Arc::new(InMemoryCas::new());
        let store = Arc::new(InMemoryOperationStore::new());
        let clients = clients(cas, store);
        for seed in 1..=3 {
            let (key, value) = anchor_batch(&clients, &[create_op(seed)]).await;
            ledger.commit_block(vec![vec![KvWrite::put(CHAINCODE, key, value)]]).unwrap();
        }

        let p = processor(&ledger, clients);
        p.process_blockchain().await.unwrap();
        assert_eq!(*p.behavior().seen.lock(), vec![(1, 0), (2, 0), (3, 0)]);

        // Nothing new: a second round is a no-op.
        p.process_blockchain().await.unwrap();
        assert_eq!(p.behavior().seen.lock().len(), 3);
    }

    #[tokio::test]
    async fn transient_error_retries_then_skips() {
        let ledger = Arc::new(InMemoryLedger::new("mychannel").unwrap());
        let writer_clients = memory_clients();
        let (key, value) = anchor_batch(&writer_clients, &[create_op(1)]).await;
        ledger.commit_block(vec![vec![KvWrite::put(CHAINCODE, key, value)]]).unwrap();

        // The observer's CAS never received the files.
        let store = Arc::new(InMemoryOperationStore::new());
        let p = processor(&ledger, clients(Arc::new(InMemoryCas::new()), store.clone()));

        for attempt in 1..=3 {
            assert!(p.process_blockchain().await.is_err());
            let md = p.behavior().store.get().await.unwrap().unwrap();
            assert_eq!(md.failed_attempts, attempt);
            assert_eq!(md.last_error_code, Some(ErrorCode::NotFound));
            assert_eq!(md.last_block_processed, 1);
            assert_eq!(md.last_tx_num_processed, 0);
        }

        p.process_blockchain().await.unwrap();
        let md = p.behavior().store.get().await.unwrap().unwrap();
        assert_eq!(md.failed_attempts, 0);
        assert_eq!(md.last_error_code, None);
        assert_eq!(md.last_block_processed, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn ledger_outage_keeps_progress() {
        let ledger = Arc::new(InMemoryLedger::new("mychannel").unwrap());
        let clients = memory_clients();
        let (key, value) = anchor_batch(&clients, &[create_op(1)]).await;
        ledger.commit_block(vec![vec![KvWrite::put(CHAINCODE, key, value)]]).unwrap();

        let p = processor(&ledger, clients);
        ledger.set_unavailable(true);
        assert!(p.process_blockchain().await.is_err());
        assert_eq!(p.behavior().store.get().await.unwrap().unwrap().last_block_processed, 0);

        ledger.set_unavailable(false);
        p.process_blockchain().await.unwrap();
        assert_eq!(*p.behavior().seen.lock(), vec![(1, 0)]);
    }

    #[tokio::test]
    async fn namespace_matches_record() {
        let ledger = Arc::new(InMemoryLedger::new("mychannel").unwrap());
        let cas = Arc::new(InMemoryCas::new());
        let store = Arc::new(InMemoryOperationStore::new());
        let clients = clients(cas, store.clone());
        let op = create_op(7);
        let (key, value) = anchor_batch(&clients, &[op.clone()]).await;
        ledger.commit_block(vec![vec![KvWrite::put(CHAINCODE, key, value)]]).unwrap();

        processor(&ledger, clients).process_blockchain().await.unwrap();
        let stored = store.get(op.unique_suffix()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].namespace, NAMESPACE);
    }
}
