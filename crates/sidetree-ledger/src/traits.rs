use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::block::{Block, BlockHash, BlockchainInfo, TxAck};
use crate::error::LedgerResult;

/// Read and submit boundary of a ledger channel.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Channel this gateway is bound to.
    fn channel(&self) -> &str;

    async fn info(&self) -> LedgerResult<BlockchainInfo>;

    /// Number of committed blocks; the newest block is `height - 1`.
    async fn height(&self) -> LedgerResult<u64> {
        Ok(self.info().await?.height)
    }

    async fn block_by_number(&self, number: u64) -> LedgerResult<Block>;

    async fn block_by_hash(&self, hash: &BlockHash) -> LedgerResult<Block>;

    /// Submit a single write and wait for it to commit.
    ///
    /// An empty `collection` writes to public state.
    async fn submit(
        &self,
        namespace: &str,
        collection: &str,
        key: &str,
        value: Vec<u8>,
    ) -> LedgerResult<TxAck>;
}

/// Best-effort feed of committed blocks.
///
/// Slow subscribers may miss blocks; periodic polling is the safety net.
pub trait BlockPublisher: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<Arc<Block>>;
}
