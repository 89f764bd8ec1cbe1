//! The four files a batch is published as.
//!
//! ```text
//! anchor "<count>.<core>" ──► core index ──► provisional index ──► chunk
//!                                  └──────► proof
//! ```
//!
//! Every operation reference carries `index`, its position in the batch.
//! Delta-bearing operations (create, update, recover) consume the chunk's
//! deltas in index order, so the chunk holds deltas in queue order.

use serde::{Deserialize, Serialize};
use sidetree_protocol::{ProtocolError, ProtocolResult};

use crate::model::{Delta, SignedData, SuffixData};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReference {
    pub index: u32,
    pub suffix_data: SuffixData,
}

/// A reference to an existing DID: recover, deactivate or update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffixReference {
    pub index: u32,
    pub did_suffix: String,
    pub reveal_value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreOperations {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub create: Vec<CreateReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recover: Vec<SuffixReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deactivate: Vec<SuffixReference>,
}

/// Root of a batch's file graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreIndexFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisional_index_file_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_file_uri: Option<String>,
    #[serde(default)]
    pub operations: CoreOperations,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReference {
    pub chunk_file_uri: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionalOperations {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update: Vec<SuffixReference>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionalIndexFile {
    pub chunks: Vec<ChunkReference>,
    #[serde(default)]
    pub operations: ProvisionalOperations,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFile {
    pub deltas: Vec<Delta>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofEntry {
    pub index: u32,
    pub signed_data: SignedData,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofFile {
    pub operations: Vec<ProofEntry>,
}

impl CoreIndexFile {
    /// Operations referenced directly by the core index.
    pub fn count(&self) -> usize {
        self.operations.create.len()
            + self.operations.recover.len()
            + self.operations.deactivate.len()
    }
}

/// Serialize a file to JSON.
pub(crate) fn to_json<T: Serialize>(what: &'static str, file: &T) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(file).map_err(|e| ProtocolError::malformed(what, e))
}

/// Parse a file from JSON.
pub(crate) fn from_json<T: serde::de::DeserializeOwned>(
    what: &'static str,
    bytes: &[u8],
) -> ProtocolResult<T> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::malformed(what, e))
}
