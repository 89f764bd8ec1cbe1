use std::sync::Arc;

use async_trait::async_trait;
use sidetree_crypto::Cid;
use sidetree_protocol::{BatchEncoder, Compressor, ProtocolError, ProtocolResult};
use sidetree_store::Cas;
use sidetree_types::{AnchorString, QueuedOperation};
use tracing::{debug, info, warn};

use crate::files::{
    to_json, ChunkFile, ChunkReference, CoreIndexFile, CreateReference, ProofEntry, ProofFile,
    ProvisionalIndexFile, SuffixReference,
};
use crate::model::Request;
use crate::parser::OperationParser;

/// Encodes a batch as chunk, proof, provisional-index and core-index files.
pub struct V1BatchEncoder {
    parser: OperationParser,
    cas: Arc<dyn Cas>,
    compressor: Arc<dyn Compressor>,
}

impl V1BatchEncoder {
    pub fn new(
        parser: OperationParser,
        cas: Arc<dyn Cas>,
        compressor: Arc<dyn Compressor>,
    ) -> Self {
        Self {
            parser,
            cas,
            compressor,
        }
    }

    async fn put_file(&self, what: &'static str, json: &[u8], max: usize) -> ProtocolResult<Cid> {
        let compressed = self.compressor.compress(json)?;
        if compressed.len() > max {
            return Err(ProtocolError::SizeExceeded {
                what,
                size: compressed.len(),
                max,
            });
        }
        let cid = self.cas.put_bytes(&compressed).await?;
        debug!(file = what, %cid, size = compressed.len(), "stored batch file");
        Ok(cid)
    }
}

#[async_trait]
impl BatchEncoder for V1BatchEncoder {
    async fn write_batch(&self, ops: &[QueuedOperation]) -> ProtocolResult<AnchorString> {
        let protocol = self.parser.protocol();
        if ops.len() > protocol.max_operation_count {
            return Err(ProtocolError::SizeExceeded {
                what: "batch operation count",
                size: ops.len(),
                max: protocol.max_operation_count,
            });
        }

        let mut core = CoreIndexFile::default();
        let mut provisional = ProvisionalIndexFile::default();
        let mut chunk = ChunkFile::default();
        let mut proof = ProofFile::default();
        let mut batch_size = 0usize;
        let mut index = 0u32;

        for queued in ops {
            let op = &queued.operation;
            let request = match self.parser.parse(op.op_type(), op.payload()) {
                Ok(r) => r,
                Err(e) => {
                    warn!(
                        suffix = op.unique_suffix(),
                        error = %e,
                        "dropping invalid operation from batch"
                    );
                    continue;
                }
            };
            batch_size += op.payload().len();

            if let Some(signed_data) = request.signed_data() {
                proof.operations.push(ProofEntry { index, signed_data });
            }
            match request {
                Request::Create(r) => {
                    core.operations.create.push(CreateReference {
                        index,
                        suffix_data: r.suffix_data,
                    });
                    chunk.deltas.push(r.delta);
                }
                Request::Update(r) => {
                    provisional.operations.update.push(SuffixReference {
                        index,
                        did_suffix: r.did_suffix,
                        reveal_value: r.reveal_value,
                    });
                    chunk.deltas.push(r.delta);
                }
                Request::Recover(r) => {
                    core.operations.recover.push(SuffixReference {
                        index,
                        did_suffix: r.did_suffix,
                        reveal_value: r.reveal_value,
                    });
                    chunk.deltas.push(r.delta);
                }
                Request::Deactivate(r) => {
                    core.operations.deactivate.push(SuffixReference {
                        index,
                        did_suffix: r.did_suffix,
                        reveal_value: r.reveal_value,
                    });
                }
            }
            index += 1;
        }

        let count = index as usize;
        if count == 0 {
            return Err(ProtocolError::InvalidOperation(
                "batch has no valid operations".into(),
            ));
        }
        if batch_size > protocol.max_batch_size(count) {
            return Err(ProtocolError::SizeExceeded {
                what: "batch",
                size: batch_size,
                max: protocol.max_batch_size(count),
            });
        }

        // Referenced files first, core index last.
        if !chunk.deltas.is_empty() {
            let chunk_cid = self
                .put_file(
                    "chunk file",
                    &to_json("chunk file", &chunk)?,
                    protocol.max_chunk_file_size,
                )
                .await?;
            provisional.chunks.push(ChunkReference {
                chunk_file_uri: chunk_cid.to_string(),
            });
        }
        if !proof.operations.is_empty() {
            let proof_cid = self
                .put_file(
                    "proof file",
                    &to_json("proof file", &proof)?,
                    protocol.max_proof_file_size,
                )
                .await?;
            core.proof_file_uri = Some(proof_cid.to_string());
        }
        if !provisional.chunks.is_empty() {
            let provisional_cid = self
                .put_file(
                    "provisional index file",
                    &to_json("provisional index file", &provisional)?,
                    protocol.max_provisional_index_file_size,
                )
                .await?;
            core.provisional_index_file_uri = Some(provisional_cid.to_string());
        }
        let core_cid = self
            .put_file(
                "core index file",
                &to_json("core index file", &core)?,
                protocol.max_core_index_file_size,
            )
            .await?;

        let anchor = AnchorString::parse_with_limit(
            &AnchorString::new(count as u64, core_cid.to_string()).to_string(),
            protocol.max_cas_uri_length,
        )?;
        info!(anchor = %anchor, operations = count, "encoded batch");
        Ok(anchor)
    }
}
