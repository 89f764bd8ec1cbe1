use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sidetree_crypto::Multihasher;
use sidetree_types::AnchoredOperation;

use crate::error::{StoreError, StoreResult};
use crate::memory::InMemoryOperationStore;

/// Persistent store of anchored operations for one namespace.
///
/// Implementations must satisfy:
/// - `put` is idempotent: each operation is keyed by the content address of
///   its canonical serialization, so replaying a block stores nothing new.
/// - `get` returns every operation for a suffix ordered by
///   `(transaction_time, transaction_number, operation_index)`.
/// - `get` on an unknown suffix fails with [`StoreError::SuffixNotFound`].
#[async_trait]
pub trait OperationStore: Send + Sync {
    async fn put(&self, ops: &[AnchoredOperation]) -> StoreResult<()>;

    async fn get(&self, unique_suffix: &str) -> StoreResult<Vec<AnchoredOperation>>;

    /// Like `get`, but an unknown suffix yields an empty list.
    async fn get_or_empty(&self, unique_suffix: &str) -> StoreResult<Vec<AnchoredOperation>> {
        match self.get(unique_suffix).await {
            Err(StoreError::SuffixNotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }
}

/// Resolves the operation store for a namespace.
pub trait OperationStoreProvider: Send + Sync {
    fn for_namespace(&self, namespace: &str) -> StoreResult<Arc<dyn OperationStore>>;
}

/// Content address of an anchored operation.
pub fn operation_key(op: &AnchoredOperation) -> StoreResult<String> {
    Multihasher::SHA2_256
        .hash_json(op)
        .map_err(|e| StoreError::InvalidKey(e.to_string()))
}

/// Provider that lazily creates one [`InMemoryOperationStore`] per namespace.
#[derive(Default)]
pub struct InMemoryOperationStoreProvider {
    stores: RwLock<HashMap<String, Arc<InMemoryOperationStore>>>,
}

impl InMemoryOperationStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The concrete store for `namespace`, created on first use.
    pub fn store(&self, namespace: &str) -> Arc<InMemoryOperationStore> {
        if let Some(store) = self.stores.read().expect("lock poisoned").get(namespace) {
            return Arc::clone(store);
        }
        let mut stores = self.stores.write().expect("lock poisoned");
        Arc::clone(
            stores
                .entry(namespace.to_string())
                .or_insert_with(|| Arc::new(InMemoryOperationStore::new())),
        )
    }
}

impl OperationStoreProvider for InMemoryOperationStoreProvider {
    fn for_namespace(&self, namespace: &str) -> StoreResult<Arc<dyn OperationStore>> {
        Ok(self.store(namespace))
    }
}
