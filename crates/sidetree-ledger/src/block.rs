use std::fmt;

use serde::{Deserialize, Serialize};
use sidetree_crypto::Multihasher;

use crate::error::{LedgerError, LedgerResult};

/// SHA2-256 hash of a block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> LedgerResult<Self> {
        let bytes = hex::decode(s).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| LedgerError::Serialization(format!("block hash must be 32 bytes: {s}")))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// One namespaced key/value write recorded by a transaction.
///
/// `namespace` is the chaincode that produced the write. Writes to a
/// private collection carry the collection name and are never anchors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvWrite {
    pub namespace: String,
    pub collection: Option<String>,
    pub key: String,
    pub value: Vec<u8>,
    pub is_delete: bool,
}

impl KvWrite {
    /// A public-state write.
    pub fn put(namespace: impl Into<String>, key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            namespace: namespace.into(),
            collection: None,
            key: key.into(),
            value,
            is_delete: false,
        }
    }

    /// A public-state delete.
    pub fn delete(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            collection: None,
            key: key.into(),
            value: Vec::new(),
            is_delete: true,
        }
    }
}

/// A committed transaction and its writes, in recorded order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_id: String,
    pub tx_num: u64,
    pub writes: Vec<KvWrite>,
}

/// A committed block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub channel: String,
    pub number: u64,
    pub previous_hash: BlockHash,
    pub hash: BlockHash,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Build a block, computing its hash over number, parent and contents.
    pub fn new(
        channel: impl Into<String>,
        number: u64,
        previous_hash: BlockHash,
        transactions: Vec<Transaction>,
    ) -> LedgerResult<Self> {
        let body = bincode::serialize(&(number, &previous_hash, &transactions))
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        Ok(Self {
            channel: channel.into(),
            number,
            previous_hash,
            hash: BlockHash(Multihasher::digest(&body)),
            transactions,
        })
    }
}

/// Snapshot of the chain tip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainInfo {
    pub height: u64,
    pub current_block_hash: BlockHash,
    pub previous_block_hash: BlockHash,
}

/// Acknowledgement of a committed transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAck {
    pub tx_id: String,
    pub block_num: u64,
    pub tx_num: u64,
}

/// Notification of a committed Sidetree transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    pub block_num: u64,
    pub tx_num: u64,
    pub channel: String,
    pub tx_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_hash_covers_contents() {
        let tx = |v: &[u8]| Transaction {
            tx_id: "t1".into(),
            tx_num: 0,
            writes: vec![KvWrite::put("sidetreetxn", "k", v.to_vec())],
        };
        let a = Block::new("ch", 1, BlockHash::default(), vec![tx(b"a")]).unwrap();
        let b = Block::new("ch", 1, BlockHash::default(), vec![tx(b"a")]).unwrap();
        let c = Block::new("ch", 1, BlockHash::default(), vec![tx(b"b")]).unwrap();
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn block_hash_hex_roundtrip() {
        let h = BlockHash([7u8; 32]);
        assert_eq!(BlockHash::from_hex(&h.to_hex()).unwrap(), h);
        assert!(BlockHash::from_hex("abcd").is_err());
    }
}
