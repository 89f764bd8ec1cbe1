use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::LedgerResult;

/// Private-collection storage shared by the peers of one organization.
///
/// Observer metadata lives here so that every peer of a cluster sees the
/// same progress record and lease owner.
#[async_trait]
pub trait OffLedgerStore: Send + Sync {
    async fn put(&self, collection: &str, key: &str, value: Vec<u8>) -> LedgerResult<()>;

    async fn get(&self, collection: &str, key: &str) -> LedgerResult<Option<Vec<u8>>>;
}

/// In-memory off-ledger store.
#[derive(Default)]
pub struct InMemoryOffLedgerStore {
    entries: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryOffLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OffLedgerStore for InMemoryOffLedgerStore {
    async fn put(&self, collection: &str, key: &str, value: Vec<u8>) -> LedgerResult<()> {
        self.entries
            .write()
            .expect("lock poisoned")
            .insert((collection.to_string(), key.to_string()), value);
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self
            .entries
            .read()
            .expect("lock poisoned")
            .get(&(collection.to_string(), key.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collections_are_isolated() {
        let store = InMemoryOffLedgerStore::new();
        store.put("meta_data", "Org1MSP", b"a".to_vec()).await.unwrap();
        store.put("other", "Org1MSP", b"b".to_vec()).await.unwrap();

        assert_eq!(
            store.get("meta_data", "Org1MSP").await.unwrap(),
            Some(b"a".to_vec())
        );
        assert_eq!(store.get("meta_data", "Org2MSP").await.unwrap(), None);
        assert_eq!(store.len(), 2);
    }
}
