use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sidetree_ledger::OffLedgerStore;
use sidetree_types::ObserverMetadata;
use tracing::debug;

use crate::error::{ObserverError, ObserverResult};

/// Off-ledger collection holding observer metadata.
pub const METADATA_COLLECTION: &str = "meta_data";

/// Where an observer keeps its progress record.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// `None` if nothing has been stored yet.
    async fn get(&self) -> ObserverResult<Option<ObserverMetadata>>;

    async fn put(&self, metadata: &ObserverMetadata) -> ObserverResult<()>;
}

/// Key the metadata record is stored under: the MSP id when clustered, so
/// every peer of the organization shares one record, otherwise the peer id.
pub fn metadata_key(clustered: bool, peer_id: &str, msp_id: &str) -> String {
    if clustered {
        msp_id.to_string()
    } else {
        peer_id.to_string()
    }
}

/// Metadata as JSON in the off-ledger [`METADATA_COLLECTION`].
pub struct OffLedgerMetadataStore {
    channel: String,
    key: String,
    store: Arc<dyn OffLedgerStore>,
}

impl OffLedgerMetadataStore {
    pub fn new(
        channel: impl Into<String>,
        key: impl Into<String>,
        store: Arc<dyn OffLedgerStore>,
    ) -> Self {
        Self {
            channel: channel.into(),
            key: key.into(),
            store,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl MetadataStore for OffLedgerMetadataStore {
    async fn get(&self) -> ObserverResult<Option<ObserverMetadata>> {
        let Some(bytes) = self.store.get(METADATA_COLLECTION, &self.key).await? else {
            debug!(channel = %self.channel, key = %self.key, "no metadata stored");
            return Ok(None);
        };
        if bytes.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ObserverError::Metadata(e.to_string()))
    }

    async fn put(&self, metadata: &ObserverMetadata) -> ObserverResult<()> {
        let bytes =
            serde_json::to_vec(metadata).map_err(|e| ObserverError::Metadata(e.to_string()))?;
        self.store.put(METADATA_COLLECTION, &self.key, bytes).await?;
        debug!(
            channel = %self.channel,
            key = %self.key,
            block = metadata.last_block_processed,
            tx = metadata.last_tx_num_processed,
            "stored metadata"
        );
        Ok(())
    }
}

/// Metadata kept only in process memory.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    metadata: Mutex<Option<ObserverMetadata>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `metadata` already stored.
    pub fn with(metadata: ObserverMetadata) -> Self {
        Self {
            metadata: Mutex::new(Some(metadata)),
        }
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self) -> ObserverResult<Option<ObserverMetadata>> {
        Ok(self.metadata.lock().clone())
    }

    async fn put(&self, metadata: &ObserverMetadata) -> ObserverResult<()> {
        *self.metadata.lock() = Some(metadata.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidetree_ledger::InMemoryOffLedgerStore;

    #[test]
    fn key_depends_on_clustering() {
        assert_eq!(metadata_key(true, "peer0", "Org1MSP"), "Org1MSP");
        assert_eq!(metadata_key(false, "peer0", "Org1MSP"), "peer0");
    }

    #[tokio::test]
    async fn off_ledger_round_trip() {
        let off = Arc::new(InMemoryOffLedgerStore::new());
        let store = OffLedgerMetadataStore::new("mychannel", "Org1MSP", off.clone());
        assert!(store.get().await.unwrap().is_none());

        let mut md = ObserverMetadata::new("peer0", 4);
        md.last_tx_num_processed = 2;
        store.put(&md).await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some(md));

        let raw = off.get(METADATA_COLLECTION, "Org1MSP").await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value["lease_owner"], "peer0");
    }

    #[tokio::test]
    async fn corrupt_record_is_an_error() {
        let off = Arc::new(InMemoryOffLedgerStore::new());
        off.put(METADATA_COLLECTION, "peer0", b"{".to_vec()).await.unwrap();
        let store = OffLedgerMetadataStore::new("mychannel", "peer0", off);
        assert!(matches!(store.get().await, Err(ObserverError::Metadata(_))));
    }
}
