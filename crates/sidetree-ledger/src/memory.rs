use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::block::{Block, BlockHash, BlockchainInfo, KvWrite, Transaction, TxAck};
use crate::error::{LedgerError, LedgerResult};
use crate::traits::{BlockPublisher, Ledger};

const FEED_CAPACITY: usize = 256;

/// In-memory ledger channel.
///
/// Block 0 is an empty genesis block. Every [`Ledger::submit`] commits one
/// block holding one transaction, and every committed block is broadcast to
/// subscribers. Intended for tests and single-process deployments.
pub struct InMemoryLedger {
    channel: String,
    blocks: RwLock<Vec<Arc<Block>>>,
    feed: broadcast::Sender<Arc<Block>>,
    unavailable: AtomicBool,
}

impl InMemoryLedger {
    pub fn new(channel: impl Into<String>) -> LedgerResult<Self> {
        let channel = channel.into();
        let genesis = Block::new(channel.clone(), 0, BlockHash::default(), Vec::new())?;
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Ok(Self {
            channel,
            blocks: RwLock::new(vec![Arc::new(genesis)]),
            feed,
            unavailable: AtomicBool::new(false),
        })
    }

    /// Simulate an outage: every call fails with [`LedgerError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Commit a block whose transactions carry the given writes.
    ///
    /// Transaction ids are generated and transaction numbers follow the
    /// order of `transactions`.
    pub fn commit_block(&self, transactions: Vec<Vec<KvWrite>>) -> LedgerResult<Arc<Block>> {
        self.check_available()?;
        let txs = transactions
            .into_iter()
            .enumerate()
            .map(|(i, writes)| Transaction {
                tx_id: Uuid::now_v7().to_string(),
                tx_num: i as u64,
                writes,
            })
            .collect();

        let block = {
            let mut blocks = self.blocks.write().expect("lock poisoned");
            let parent = blocks.last().map(|b| b.hash).unwrap_or_default();
            let block = Arc::new(Block::new(
                self.channel.clone(),
                blocks.len() as u64,
                parent,
                txs,
            )?);
            blocks.push(Arc::clone(&block));
            block
        };

        debug!(
            channel = %self.channel,
            block = block.number,
            txs = block.transactions.len(),
            "committed block"
        );
        // No subscribers is not an error; the feed is best-effort.
        let _ = self.feed.send(Arc::clone(&block));
        Ok(block)
    }

    fn check_available(&self) -> LedgerResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable(format!(
                "channel {} is unavailable",
                self.channel
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn info(&self) -> LedgerResult<BlockchainInfo> {
        self.check_available()?;
        let blocks = self.blocks.read().expect("lock poisoned");
        let current = blocks.last().map(|b| b.hash).unwrap_or_default();
        let previous = blocks.last().map(|b| b.previous_hash).unwrap_or_default();
        Ok(BlockchainInfo {
            height: blocks.len() as u64,
            current_block_hash: current,
            previous_block_hash: previous,
        })
    }

    async fn block_by_number(&self, number: u64) -> LedgerResult<Block> {
        self.check_available()?;
        let blocks = self.blocks.read().expect("lock poisoned");
        blocks
            .get(number as usize)
            .map(|b| (**b).clone())
            .ok_or(LedgerError::BlockNotFound {
                number,
                height: blocks.len() as u64,
            })
    }

    async fn block_by_hash(&self, hash: &BlockHash) -> LedgerResult<Block> {
        self.check_available()?;
        let blocks = self.blocks.read().expect("lock poisoned");
        blocks
            .iter()
            .find(|b| b.hash == *hash)
            .map(|b| (**b).clone())
            .ok_or_else(|| LedgerError::BlockHashNotFound(hash.to_hex()))
    }

    async fn submit(
        &self,
        namespace: &str,
        collection: &str,
        key: &str,
        value: Vec<u8>,
    ) -> LedgerResult<TxAck> {
        if key.is_empty() {
            return Err(LedgerError::InvalidWrite("empty key".into()));
        }
        let write = KvWrite {
            namespace: namespace.to_string(),
            collection: (!collection.is_empty()).then(|| collection.to_string()),
            key: key.to_string(),
            value,
            is_delete: false,
        };
        let block = self.commit_block(vec![vec![write]])?;
        let tx = block.transactions.first().ok_or_else(|| {
            warn!(block = block.number, "committed block has no transaction");
            LedgerError::Rejected("empty block".into())
        })?;
        Ok(TxAck {
            tx_id: tx.tx_id.clone(),
            block_num: block.number,
            tx_num: tx.tx_num,
        })
    }
}

impl BlockPublisher for InMemoryLedger {
    fn subscribe(&self) -> broadcast::Receiver<Arc<Block>> {
        self.feed.subscribe()
    }
}
