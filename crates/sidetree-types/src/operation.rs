use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The kind of mutation an operation applies to a DID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Recover,
    Deactivate,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Recover => "recover",
            Self::Deactivate => "deactivate",
        }
    }

    /// Operations of this type carry a delta that lands in the chunk file.
    pub fn has_delta(&self) -> bool {
        !matches!(self, Self::Deactivate)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "recover" => Ok(Self::Recover),
            "deactivate" => Ok(Self::Deactivate),
            other => Err(TypeError::UnknownOperationType(other.to_string())),
        }
    }
}

/// A submitted request to mutate one DID.
///
/// The unique suffix and type are fixed at construction; the payload is the
/// protocol request (delta plus suffix data or signed data) and is opaque to
/// everything except the protocol version that parses it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOperation")]
pub struct Operation {
    unique_suffix: String,
    op_type: OperationType,
    namespace: String,
    #[serde(with = "crate::serde_bytes")]
    payload: Vec<u8>,
    arrived_at: i64,
}

#[derive(Deserialize)]
struct RawOperation {
    unique_suffix: String,
    op_type: OperationType,
    namespace: String,
    #[serde(with = "crate::serde_bytes")]
    payload: Vec<u8>,
    arrived_at: i64,
}

impl TryFrom<RawOperation> for Operation {
    type Error = TypeError;

    fn try_from(raw: RawOperation) -> Result<Self, Self::Error> {
        let mut op = Self::new(raw.unique_suffix, raw.op_type, raw.namespace, raw.payload)?;
        op.arrived_at = raw.arrived_at;
        Ok(op)
    }
}

impl Operation {
    /// Create an operation stamped with the current wall-clock time.
    pub fn new(
        unique_suffix: impl Into<String>,
        op_type: OperationType,
        namespace: impl Into<String>,
        payload: Vec<u8>,
    ) -> Result<Self, TypeError> {
        let unique_suffix = unique_suffix.into();
        if unique_suffix.is_empty() {
            return Err(TypeError::EmptySuffix);
        }
        Ok(Self {
            unique_suffix,
            op_type,
            namespace: namespace.into(),
            payload,
            arrived_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Override the arrival timestamp (unix millis).
    pub fn with_arrived_at(mut self, arrived_at: i64) -> Self {
        self.arrived_at = arrived_at;
        self
    }

    pub fn unique_suffix(&self) -> &str {
        &self.unique_suffix
    }

    pub fn op_type(&self) -> OperationType {
        self.op_type
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Arrival time in unix milliseconds.
    pub fn arrived_at(&self) -> i64 {
        self.arrived_at
    }

    /// The DID this operation targets (`<namespace>:<suffix>`).
    pub fn id(&self) -> String {
        format!("{}:{}", self.namespace, self.unique_suffix)
    }
}

/// An operation enqueued together with the protocol version it was accepted under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub operation: Operation,
    pub protocol_genesis_time: u64,
}

impl QueuedOperation {
    pub fn new(operation: Operation, protocol_genesis_time: u64) -> Self {
        Self {
            operation,
            protocol_genesis_time,
        }
    }
}

/// An operation attributed to a position on the ledger.
///
/// The ordering key `(transaction_time, transaction_number, operation_index)`
/// is the sole tiebreak among operations on the same DID.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchoredOperation {
    pub unique_suffix: String,
    pub op_type: OperationType,
    pub namespace: String,
    #[serde(with = "crate::serde_bytes")]
    pub payload: Vec<u8>,
    /// Block number the anchor was committed in.
    pub transaction_time: u64,
    /// Transaction number within the block.
    pub transaction_number: u64,
    /// Position of the operation within its batch.
    pub operation_index: u32,
    pub protocol_genesis_time: u64,
}

impl AnchoredOperation {
    pub fn ordering_key(&self) -> (u64, u64, u32) {
        (
            self.transaction_time,
            self.transaction_number,
            self.operation_index,
        )
    }
}
