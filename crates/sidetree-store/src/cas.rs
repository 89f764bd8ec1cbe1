use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sidetree_crypto::Cid;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{StoreError, StoreResult};

/// Options for a streaming CAS put.
#[derive(Clone, Debug, Default)]
pub struct PutOptions {
    /// Reject content larger than this many bytes.
    pub max_size: Option<usize>,
}

impl PutOptions {
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size: Some(max_size),
        }
    }
}

/// A named reference from one CAS node to another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub cid: Cid,
    pub size: u64,
}

/// A CAS node: its data plus any links to child nodes.
///
/// Raw nodes (everything the batch writer stores) have no links.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub links: Vec<Link>,
    pub data: Bytes,
}

/// Content-addressed store.
///
/// All implementations must satisfy these invariants:
/// - The returned CID is computed from the content; identical content always
///   yields the same CID and a repeated put is a no-op.
/// - `get` returns exactly the bytes that were put.
/// - Errors are classified so callers can decide whether to retry.
#[async_trait]
pub trait Cas: Send + Sync {
    /// Stream content into the store and return its CID.
    async fn put(
        &self,
        content: &mut (dyn AsyncRead + Unpin + Send),
        opts: PutOptions,
    ) -> StoreResult<Cid>;

    /// Read content by CID.
    async fn get(&self, cid: &Cid) -> StoreResult<Bytes>;

    /// Read content by CID together with its links.
    async fn get_node(&self, cid: &Cid) -> StoreResult<Node>;

    /// Store an in-memory buffer.
    async fn put_bytes(&self, data: &[u8]) -> StoreResult<Cid> {
        let mut reader = data;
        self.put(&mut reader, PutOptions::default()).await
    }
}

/// Drain a reader into memory, enforcing the put size limit.
pub(crate) async fn read_limited(
    content: &mut (dyn AsyncRead + Unpin + Send),
    opts: &PutOptions,
) -> StoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    match opts.max_size {
        Some(max) => {
            let mut limited = content.take(max as u64 + 1);
            limited.read_to_end(&mut buf).await?;
            if buf.len() > max {
                return Err(StoreError::TooLarge {
                    size: buf.len(),
                    max,
                });
            }
        }
        None => {
            content.read_to_end(&mut buf).await?;
        }
    }
    Ok(buf)
}
