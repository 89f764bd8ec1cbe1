use serde::de::DeserializeOwned;
use serde_json::Value;
use sidetree_crypto::Multihasher;
use sidetree_protocol::{Protocol, ProtocolError, ProtocolResult};
use sidetree_types::OperationType;

use crate::model::{CreateRequest, Delta, Request};

/// Parses and checks request payloads against one protocol's parameters.
#[derive(Clone, Debug)]
pub struct OperationParser {
    protocol: Protocol,
    hasher: Multihasher,
}

impl OperationParser {
    pub fn new(protocol: Protocol) -> ProtocolResult<Self> {
        let hasher = protocol.multihasher()?;
        Ok(Self { protocol, hasher })
    }

    pub fn hasher(&self) -> &Multihasher {
        &self.hasher
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Parse a payload of the given type and check its internal consistency.
    pub fn parse(&self, op_type: OperationType, payload: &[u8]) -> ProtocolResult<Request> {
        if payload.len() > self.protocol.max_operation_size {
            return Err(ProtocolError::SizeExceeded {
                what: "operation",
                size: payload.len(),
                max: self.protocol.max_operation_size,
            });
        }

        let request = match op_type {
            OperationType::Create => Request::Create(decode(payload)?),
            OperationType::Update => Request::Update(decode(payload)?),
            OperationType::Recover => Request::Recover(decode(payload)?),
            OperationType::Deactivate => Request::Deactivate(decode(payload)?),
        };
        self.check(&request)?;
        Ok(request)
    }

    /// The unique suffix a request applies to.
    pub fn unique_suffix(&self, request: &Request) -> ProtocolResult<String> {
        match request {
            Request::Create(r) => Ok(r.unique_suffix(&self.hasher)?),
            Request::Update(r) => Ok(r.did_suffix.clone()),
            Request::Recover(r) => Ok(r.did_suffix.clone()),
            Request::Deactivate(r) => Ok(r.did_suffix.clone()),
        }
    }

    fn check(&self, request: &Request) -> ProtocolResult<()> {
        match request {
            Request::Create(r) => self.check_create(r),
            Request::Update(r) => {
                self.check_suffix(&r.did_suffix)?;
                self.check_hash_value("reveal_value", &r.reveal_value)?;
                self.check_delta(&r.delta, &r.signed_data.delta_hash)
            }
            Request::Recover(r) => {
                self.check_suffix(&r.did_suffix)?;
                self.check_hash_value("reveal_value", &r.reveal_value)?;
                self.check_commitment("recovery_commitment", &r.signed_data.recovery_commitment)?;
                self.check_delta(&r.delta, &r.signed_data.delta_hash)
            }
            Request::Deactivate(r) => {
                self.check_suffix(&r.did_suffix)?;
                self.check_hash_value("reveal_value", &r.reveal_value)?;
                if r.signed_data.did_suffix != r.did_suffix {
                    return Err(ProtocolError::InvalidOperation(format!(
                        "signed did suffix {} does not match {}",
                        r.signed_data.did_suffix, r.did_suffix
                    )));
                }
                Ok(())
            }
        }
    }

    fn check_create(&self, r: &CreateRequest) -> ProtocolResult<()> {
        self.check_commitment("recovery_commitment", &r.suffix_data.recovery_commitment)?;
        self.check_delta(&r.delta, &r.suffix_data.delta_hash)
    }

    fn check_suffix(&self, suffix: &str) -> ProtocolResult<()> {
        if suffix.is_empty() {
            return Err(ProtocolError::InvalidOperation("missing did suffix".into()));
        }
        self.check_hash_value("did_suffix", suffix)
    }

    /// The delta must fit, carry known patches and hash to `delta_hash`.
    fn check_delta(&self, delta: &Delta, delta_hash: &str) -> ProtocolResult<()> {
        let bytes =
            serde_json::to_vec(delta).map_err(|e| ProtocolError::malformed("delta", e))?;
        if bytes.len() > self.protocol.max_delta_size {
            return Err(ProtocolError::SizeExceeded {
                what: "delta",
                size: bytes.len(),
                max: self.protocol.max_delta_size,
            });
        }

        self.check_commitment("update_commitment", &delta.update_commitment)?;

        if delta.patches.is_empty() {
            return Err(ProtocolError::InvalidOperation("delta has no patches".into()));
        }
        for patch in &delta.patches {
            let action = patch
                .get("action")
                .and_then(Value::as_str)
                .ok_or_else(|| ProtocolError::InvalidOperation("patch without action".into()))?;
            if !self.protocol.patches.iter().any(|p| p == action) {
                return Err(ProtocolError::InvalidOperation(format!(
                    "patch action '{action}' not supported"
                )));
            }
        }

        if self.hasher.hash_encoded(&bytes) != delta_hash {
            return Err(ProtocolError::InvalidOperation(
                "delta does not match delta hash".into(),
            ));
        }
        Ok(())
    }

    fn check_commitment(&self, what: &str, commitment: &str) -> ProtocolResult<()> {
        self.check_hash_value(what, commitment)?;
        self.hasher.validate_encoded(commitment).map_err(|e| {
            ProtocolError::InvalidOperation(format!("{what} is not a valid multihash: {e}"))
        })
    }

    fn check_hash_value(&self, what: &str, value: &str) -> ProtocolResult<()> {
        if value.len() > self.protocol.max_operation_hash_length {
            return Err(ProtocolError::InvalidOperation(format!(
                "{what} length {} exceeds maximum {}",
                value.len(),
                self.protocol.max_operation_hash_length
            )));
        }
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> ProtocolResult<T> {
    serde_json::from_slice(payload).map_err(|e| ProtocolError::malformed("operation request", e))
}
