//! Commitment checks against the operation store.
//!
//! A DID's state is the fold of its anchored operations in ordering-key
//! order. An incoming operation survives only if it applies cleanly on top
//! of the stored history plus the operations accepted before it in the
//! same batch.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sidetree_protocol::{ProtocolError, ProtocolResult};
use sidetree_store::OperationStore;
use sidetree_types::AnchoredOperation;
use tracing::{debug, warn};

use crate::model::Request;
use crate::parser::OperationParser;

/// The folded state of one DID.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentState {
    pub unique_suffix: String,
    pub update_commitment: Option<String>,
    pub recovery_commitment: Option<String>,
    pub deactivated: bool,
    /// Patches applied since creation or the last recovery.
    pub patches: Vec<Value>,
    /// Ordering key of the last applied operation.
    pub last_operation: Option<(u64, u64, u32)>,
}

impl DocumentState {
    pub fn new(unique_suffix: impl Into<String>) -> Self {
        Self {
            unique_suffix: unique_suffix.into(),
            ..Default::default()
        }
    }

    /// Whether a create has been applied.
    pub fn exists(&self) -> bool {
        self.recovery_commitment.is_some() || self.deactivated
    }

    /// Apply one operation, or explain why it does not apply.
    pub fn apply(
        &mut self,
        parser: &OperationParser,
        op: &AnchoredOperation,
    ) -> ProtocolResult<()> {
        let request = parser.parse(op.op_type, &op.payload)?;
        let hasher = parser.hasher();

        match request {
            Request::Create(r) => {
                if self.exists() {
                    return Err(reject(op, "did already exists"));
                }
                self.recovery_commitment = Some(r.suffix_data.recovery_commitment);
                self.update_commitment = Some(r.delta.update_commitment);
                self.patches = r.delta.patches;
            }
            Request::Update(r) => {
                let commitment = self.live_commitment(op, self.update_commitment.as_deref())?;
                if !hasher.reveals(&r.reveal_value, commitment) {
                    return Err(reject(op, "reveal value does not match update commitment"));
                }
                self.update_commitment = Some(r.delta.update_commitment);
                self.patches.extend(r.delta.patches);
            }
            Request::Recover(r) => {
                let commitment = self.live_commitment(op, self.recovery_commitment.as_deref())?;
                if !hasher.reveals(&r.reveal_value, commitment) {
                    return Err(reject(op, "reveal value does not match recovery commitment"));
                }
                self.recovery_commitment = Some(r.signed_data.recovery_commitment);
                self.update_commitment = Some(r.delta.update_commitment);
                self.patches = r.delta.patches;
            }
            Request::Deactivate(r) => {
                let commitment = self.live_commitment(op, self.recovery_commitment.as_deref())?;
                if !hasher.reveals(&r.reveal_value, commitment) {
                    return Err(reject(op, "reveal value does not match recovery commitment"));
                }
                self.deactivated = true;
                self.update_commitment = None;
                self.recovery_commitment = None;
            }
        }
        self.last_operation = Some(op.ordering_key());
        Ok(())
    }

    fn live_commitment<'a>(
        &self,
        op: &AnchoredOperation,
        commitment: Option<&'a str>,
    ) -> ProtocolResult<&'a str> {
        if self.deactivated {
            return Err(reject(op, "did is deactivated"));
        }
        commitment.ok_or_else(|| reject(op, "did does not exist"))
    }
}

fn reject(op: &AnchoredOperation, reason: &str) -> ProtocolError {
    ProtocolError::InvalidOperation(format!(
        "{} {}: {reason}",
        op.op_type.as_str(),
        op.unique_suffix
    ))
}

/// Fold a suffix's history, skipping operations that do not apply.
pub fn fold(parser: &OperationParser, suffix: &str, ops: &[AnchoredOperation]) -> DocumentState {
    let mut state = DocumentState::new(suffix);
    for op in ops {
        if let Err(e) = state.apply(parser, op) {
            debug!(suffix, error = %e, "skipping stored operation");
        }
    }
    state
}

/// Filters hydrated operations down to those that apply.
pub struct OperationFilter {
    parser: OperationParser,
    op_store: Arc<dyn OperationStore>,
}

impl OperationFilter {
    pub fn new(parser: OperationParser, op_store: Arc<dyn OperationStore>) -> Self {
        Self { parser, op_store }
    }

    /// Keep, in their original order, the operations that apply.
    ///
    /// Operations already in the store are kept so a replayed transaction
    /// stores the same set again. Store read failures propagate.
    pub async fn filter(
        &self,
        ops: Vec<AnchoredOperation>,
    ) -> ProtocolResult<Vec<AnchoredOperation>> {
        let mut states: BTreeMap<String, (DocumentState, HashSet<(u64, u64, u32)>)> =
            BTreeMap::new();
        let mut accepted = Vec::with_capacity(ops.len());

        for op in ops {
            if !states.contains_key(&op.unique_suffix) {
                let stored = self.op_store.get_or_empty(&op.unique_suffix).await?;
                let keys = stored.iter().map(AnchoredOperation::ordering_key).collect();
                let state = fold(&self.parser, &op.unique_suffix, &stored);
                states.insert(op.unique_suffix.clone(), (state, keys));
            }
            let Some((state, stored_keys)) = states.get_mut(&op.unique_suffix) else {
                continue;
            };

            if stored_keys.contains(&op.ordering_key()) {
                accepted.push(op);
                continue;
            }

            let mut next = state.clone();
            match next.apply(&self.parser, &op) {
                Ok(()) => {
                    *state = next;
                    accepted.push(op);
                }
                Err(e) => warn!(
                    suffix = %op.unique_suffix,
                    block = op.transaction_time,
                    tx = op.transaction_number,
                    index = op.operation_index,
                    error = %e,
                    "discarding operation"
                ),
            }
        }
        Ok(accepted)
    }
}

/// Resolves the current state of a DID from the operation store.
pub struct DocumentResolver {
    parser: OperationParser,
    op_store: Arc<dyn OperationStore>,
}

impl DocumentResolver {
    pub fn new(parser: OperationParser, op_store: Arc<dyn OperationStore>) -> Self {
        Self { parser, op_store }
    }

    /// `None` when no create has been anchored for the suffix.
    pub async fn resolve(&self, unique_suffix: &str) -> ProtocolResult<Option<DocumentState>> {
        let ops = self.op_store.get_or_empty(unique_suffix).await?;
        let state = fold(&self.parser, unique_suffix, &ops);
        Ok(state.exists().then_some(state))
    }
}
