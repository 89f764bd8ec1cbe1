//! Request payloads carried by operations.
//!
//! Signed data is held in decoded form; signature verification happens
//! before an operation reaches the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sidetree_crypto::{CryptoResult, Multihasher};
use sidetree_types::OperationType;

/// The document changes an operation carries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// Commitment to the reveal value of the next update.
    pub update_commitment: String,
    pub patches: Vec<Value>,
}

impl Delta {
    pub fn new(update_commitment: impl Into<String>, patches: Vec<Value>) -> Self {
        Self {
            update_commitment: update_commitment.into(),
            patches,
        }
    }
}

/// Data from which a create operation's unique suffix is derived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffixData {
    pub delta_hash: String,
    pub recovery_commitment: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSignedData {
    pub delta_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverSignedData {
    pub delta_hash: String,
    pub recovery_commitment: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateSignedData {
    pub did_suffix: String,
}

/// Signed data of a non-create operation, as stored in the proof file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignedData {
    Update(UpdateSignedData),
    Recover(RecoverSignedData),
    Deactivate(DeactivateSignedData),
}

impl SignedData {
    pub fn op_type(&self) -> OperationType {
        match self {
            Self::Update(_) => OperationType::Update,
            Self::Recover(_) => OperationType::Recover,
            Self::Deactivate(_) => OperationType::Deactivate,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub suffix_data: SuffixData,
    pub delta: Delta,
}

impl CreateRequest {
    /// Build a create request whose suffix data commits to `delta`.
    pub fn new(
        hasher: &Multihasher,
        recovery_commitment: impl Into<String>,
        delta: Delta,
    ) -> CryptoResult<Self> {
        Ok(Self {
            suffix_data: SuffixData {
                delta_hash: hasher.hash_json(&delta)?,
                recovery_commitment: recovery_commitment.into(),
            },
            delta,
        })
    }

    /// The DID's unique suffix: the encoded multihash of the suffix data.
    pub fn unique_suffix(&self, hasher: &Multihasher) -> CryptoResult<String> {
        hasher.hash_json(&self.suffix_data)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub did_suffix: String,
    pub reveal_value: String,
    pub delta: Delta,
    pub signed_data: UpdateSignedData,
}

impl UpdateRequest {
    pub fn new(
        hasher: &Multihasher,
        did_suffix: impl Into<String>,
        reveal_value: impl Into<String>,
        delta: Delta,
    ) -> CryptoResult<Self> {
        Ok(Self {
            did_suffix: did_suffix.into(),
            reveal_value: reveal_value.into(),
            signed_data: UpdateSignedData {
                delta_hash: hasher.hash_json(&delta)?,
            },
            delta,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverRequest {
    pub did_suffix: String,
    pub reveal_value: String,
    pub delta: Delta,
    pub signed_data: RecoverSignedData,
}

impl RecoverRequest {
    pub fn new(
        hasher: &Multihasher,
        did_suffix: impl Into<String>,
        reveal_value: impl Into<String>,
        recovery_commitment: impl Into<String>,
        delta: Delta,
    ) -> CryptoResult<Self> {
        Ok(Self {
            did_suffix: did_suffix.into(),
            reveal_value: reveal_value.into(),
            signed_data: RecoverSignedData {
                delta_hash: hasher.hash_json(&delta)?,
                recovery_commitment: recovery_commitment.into(),
            },
            delta,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateRequest {
    pub did_suffix: String,
    pub reveal_value: String,
    pub signed_data: DeactivateSignedData,
}

impl DeactivateRequest {
    pub fn new(did_suffix: impl Into<String>, reveal_value: impl Into<String>) -> Self {
        let did_suffix = did_suffix.into();
        Self {
            signed_data: DeactivateSignedData {
                did_suffix: did_suffix.clone(),
            },
            did_suffix,
            reveal_value: reveal_value.into(),
        }
    }
}

/// A parsed request of any type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Create(CreateRequest),
    Update(UpdateRequest),
    Recover(RecoverRequest),
    Deactivate(DeactivateRequest),
}

impl Request {
    pub fn op_type(&self) -> OperationType {
        match self {
            Self::Create(_) => OperationType::Create,
            Self::Update(_) => OperationType::Update,
            Self::Recover(_) => OperationType::Recover,
            Self::Deactivate(_) => OperationType::Deactivate,
        }
    }

    pub fn delta(&self) -> Option<&Delta> {
        match self {
            Self::Create(r) => Some(&r.delta),
            Self::Update(r) => Some(&r.delta),
            Self::Recover(r) => Some(&r.delta),
            Self::Deactivate(_) => None,
        }
    }

    /// Reveal value for non-create requests.
    pub fn reveal_value(&self) -> Option<&str> {
        match self {
            Self::Create(_) => None,
            Self::Update(r) => Some(&r.reveal_value),
            Self::Recover(r) => Some(&r.reveal_value),
            Self::Deactivate(r) => Some(&r.reveal_value),
        }
    }

    pub fn signed_data(&self) -> Option<SignedData> {
        match self {
            Self::Create(_) => None,
            Self::Update(r) => Some(SignedData::Update(r.signed_data.clone())),
            Self::Recover(r) => Some(SignedData::Recover(r.signed_data.clone())),
            Self::Deactivate(r) => Some(SignedData::Deactivate(r.signed_data.clone())),
        }
    }

    /// JSON payload bytes of this request.
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Self::Create(r) => serde_json::to_vec(r),
            Self::Update(r) => serde_json::to_vec(r),
            Self::Recover(r) => serde_json::to_vec(r),
            Self::Deactivate(r) => serde_json::to_vec(r),
        }
    }
}
