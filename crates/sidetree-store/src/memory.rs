use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use sidetree_crypto::Cid;
use sidetree_types::AnchoredOperation;
use tokio::io::AsyncRead;
use tracing::debug;

use crate::cas::{read_limited, Cas, Node, PutOptions};
use crate::error::{StoreError, StoreResult};
use crate::opstore::{operation_key, OperationStore};

/// In-memory, HashMap-based content-addressed store.
///
/// Intended for tests and embedding. Content is held behind a `RwLock`;
/// `Bytes` makes reads a reference-count bump.
pub struct InMemoryCas {
    objects: RwLock<HashMap<Cid, Bytes>>,
}

impl InMemoryCas {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.objects.read().expect("lock poisoned").contains_key(cid)
    }

    /// Store raw bytes under an arbitrary CID, bypassing hashing.
    ///
    /// Used to seed content addressed by legacy identifiers.
    pub fn insert_raw(&self, cid: Cid, data: impl Into<Bytes>) {
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(cid, data.into());
    }
}

impl Default for InMemoryCas {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cas for InMemoryCas {
    async fn put(
        &self,
        content: &mut (dyn AsyncRead + Unpin + Send),
        opts: PutOptions,
    ) -> StoreResult<Cid> {
        let data = read_limited(content, &opts).await?;
        let cid = Cid::of(&data);
        let mut map = self.objects.write().expect("lock poisoned");
        map.entry(cid.clone()).or_insert_with(|| Bytes::from(data));
        Ok(cid)
    }

    async fn get(&self, cid: &Cid) -> StoreResult<Bytes> {
        let map = self.objects.read().expect("lock poisoned");
        let data = map
            .get(cid)
            .cloned()
            .ok_or_else(|| StoreError::ContentNotFound(cid.clone()))?;
        if cid.is_v1() && !cid.verify(&data) {
            return Err(StoreError::Corrupt {
                cid: cid.clone(),
                reason: "content does not match its identifier".into(),
            });
        }
        Ok(data)
    }

    async fn get_node(&self, cid: &Cid) -> StoreResult<Node> {
        let data = self.get(cid).await?;
        Ok(Node {
            links: Vec::new(),
            data,
        })
    }
}

/// In-memory operation store for one namespace.
///
/// Operations are grouped by suffix in a `BTreeMap` keyed by ledger
/// position, so reads come back ordered without sorting.
pub struct InMemoryOperationStore {
    #[allow(clippy::type_complexity)]
    by_suffix: RwLock<HashMap<String, BTreeMap<((u64, u64, u32), String), AnchoredOperation>>>,
}

impl InMemoryOperationStore {
    pub fn new() -> Self {
        Self {
            by_suffix: RwLock::new(HashMap::new()),
        }
    }

    /// Total number of operations stored.
    pub fn len(&self) -> usize {
        self.by_suffix
            .read()
            .expect("lock poisoned")
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryOperationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OperationStore for InMemoryOperationStore {
    async fn put(&self, ops: &[AnchoredOperation]) -> StoreResult<()> {
        let mut keyed = Vec::with_capacity(ops.len());
        for op in ops {
            keyed.push((operation_key(op)?, op));
        }

        let mut map = self.by_suffix.write().expect("lock poisoned");
        for (key, op) in keyed {
            map.entry(op.unique_suffix.clone())
                .or_default()
                .entry((op.ordering_key(), key))
                .or_insert_with(|| op.clone());
        }
        debug!(count = ops.len(), "stored anchored operations");
        Ok(())
    }

    async fn get(&self, unique_suffix: &str) -> StoreResult<Vec<AnchoredOperation>> {
        let map = self.by_suffix.read().expect("lock poisoned");
        match map.get(unique_suffix) {
            Some(ops) if !ops.is_empty() => Ok(ops.values().cloned().collect()),
            _ => Err(StoreError::SuffixNotFound(unique_suffix.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidetree_types::OperationType;

    // ----------------------------------------------------------------
    // CAS
    // ----------------------------------------------------------------

    #[tokio::test]
    async fn cas_put_get_roundtrip() {
        let cas = InMemoryCas::new();
        let cid = cas.put_bytes(b"batch file").await.unwrap();
        assert_eq!(cid, Cid::of(b"batch file"));
        assert_eq!(cas.get(&cid).await.unwrap(), Bytes::from_static(b"batch file"));
    }

    #[tokio::test]
    async fn cas_put_is_idempotent() {
        let cas = InMemoryCas::new();
        let a = cas.put_bytes(b"same").await.unwrap();
        let b = cas.put_bytes(b"same").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(cas.len(), 1);
    }

    #[tokio::test]
    async fn cas_missing_is_not_found() {
        let cas = InMemoryCas::new();
        let err = cas.get(&Cid::of(b"nothing")).await.unwrap_err();
        assert!(matches!(err, StoreError::ContentNotFound(_)));
    }

    #[tokio::test]
    async fn cas_enforces_max_size() {
        let cas = InMemoryCas::new();
        let mut reader: &[u8] = b"0123456789";
        let err = cas
            .put(&mut reader, PutOptions::with_max_size(4))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TooLarge { max: 4, .. }));
        assert!(cas.is_empty());

        let mut reader: &[u8] = b"0123";
        assert!(cas.put(&mut reader, PutOptions::with_max_size(4)).await.is_ok());
    }

    #[tokio::test]
    async fn cas_detects_corruption() {
        let cas = InMemoryCas::new();
        let cid = Cid::of(b"original");
        cas.insert_raw(cid.clone(), Bytes::from_static(b"tampered"));
        let err = cas.get(&cid).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn cas_get_node_has_no_links() {
        let cas = InMemoryCas::new();
        let cid = cas.put_bytes(b"raw").await.unwrap();
        let node = cas.get_node(&cid).await.unwrap();
        assert!(node.links.is_empty());
        assert_eq!(&node.data[..], b"raw");
    }

    // ----------------------------------------------------------------
    // Operation store
    // ----------------------------------------------------------------

    fn anchored(suffix: &str, time: u64, number: u64, index: u32) -> AnchoredOperation {
        AnchoredOperation {
            unique_suffix: suffix.into(),
            op_type: OperationType::Update,
            namespace: "did:sidetree".into(),
            payload: format!("{time}-{number}-{index}").into_bytes(),
            transaction_time: time,
            transaction_number: number,
            operation_index: index,
            protocol_genesis_time: 0,
        }
    }

    #[tokio::test]
    async fn opstore_orders_by_ledger_position() {
        let store = InMemoryOperationStore::new();
        store
            .put(&[
                anchored("abc", 5, 1, 0),
                anchored("abc", 2, 0, 1),
                anchored("abc", 5, 0, 0),
                anchored("abc", 2, 0, 0),
            ])
            .await
            .unwrap();

        let keys: Vec<_> = store
            .get("abc")
            .await
            .unwrap()
            .iter()
            .map(AnchoredOperation::ordering_key)
            .collect();
        assert_eq!(keys, vec![(2, 0, 0), (2, 0, 1), (5, 0, 0), (5, 1, 0)]);
    }

    #[tokio::test]
    async fn opstore_put_is_idempotent() {
        let store = InMemoryOperationStore::new();
        let ops = vec![anchored("abc", 1, 0, 0), anchored("abc", 1, 0, 1)];
        store.put(&ops).await.unwrap();
        store.put(&ops).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn opstore_unknown_suffix() {
        let store = InMemoryOperationStore::new();
        let err = store.get("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::SuffixNotFound(ref s) if s == "missing"));
        assert!(store.get_or_empty("missing").await.unwrap().is_empty());
    }
}
