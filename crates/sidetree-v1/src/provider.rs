use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use sidetree_crypto::Cid;
use sidetree_protocol::{Compressor, OperationProvider, ProtocolError, ProtocolResult};
use sidetree_store::Cas;
use sidetree_types::{AnchorString, AnchoredOperation, SidetreeTxn};
use tracing::{debug, warn};

use crate::files::{
    from_json, ChunkFile, CoreIndexFile, ProofFile, ProvisionalIndexFile, SuffixReference,
};
use crate::model::{
    CreateRequest, DeactivateRequest, RecoverRequest, Request, SignedData, SuffixData,
    UpdateRequest,
};
use crate::parser::OperationParser;

/// Decompressed files may be at most this many times their size limit.
const DECOMPRESSION_MULTIPLIER: usize = 4;

/// Hydrates an anchor into its operations by walking the batch files in CAS.
pub struct V1OperationProvider {
    parser: OperationParser,
    cas: Arc<dyn Cas>,
    compressor: Arc<dyn Compressor>,
}

impl V1OperationProvider {
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

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        what: &'static str,
        uri: &str,
        max: usize,
    ) -> ProtocolResult<T> {
        let cid: Cid = uri.parse()?;
        let bytes = self.cas.get(&cid).await?;
        if bytes.len() > max {
            return Err(ProtocolError::SizeExceeded {
                what,
                size: bytes.len(),
                max,
            });
        }
        let json = self
            .compressor
            .decompress(&bytes, max.saturating_mul(DECOMPRESSION_MULTIPLIER))?;
        debug!(file = what, %cid, size = bytes.len(), "fetched batch file");
        from_json(what, &json)
    }
}

#[async_trait]
impl OperationProvider for V1OperationProvider {
    async fn get_txn_operations(
        &self,
        txn: &SidetreeTxn,
    ) -> ProtocolResult<Vec<AnchoredOperation>> {
        let protocol = self.parser.protocol();
        let anchor =
            AnchorString::parse_with_limit(&txn.anchor_string, protocol.max_cas_uri_length)?;

        let core: CoreIndexFile = self
            .fetch(
                "core index file",
                &anchor.core_index_uri,
                protocol.max_core_index_file_size,
            )
            .await?;

        let provisional = match &core.provisional_index_file_uri {
            Some(uri) => Some(
                self.fetch::<ProvisionalIndexFile>(
                    "provisional index file",
                    uri,
                    protocol.max_provisional_index_file_size,
                )
                .await?,
            ),
            None => None,
        };

        let chunk = match provisional.as_ref().map(|p| p.chunks.as_slice()) {
            None | Some([]) => ChunkFile::default(),
            Some([only]) => {
                self.fetch("chunk file", &only.chunk_file_uri, protocol.max_chunk_file_size)
                    .await?
            }
            Some(_) => {
                return Err(ProtocolError::malformed(
                    "provisional index file",
                    "exactly one chunk file is supported",
                ))
            }
        };

        let proof = match &core.proof_file_uri {
            Some(uri) => {
                self.fetch("proof file", uri, protocol.max_proof_file_size)
                    .await?
            }
            None => ProofFile::default(),
        };

        let assembled = assemble(
            &core,
            provisional.as_ref(),
            chunk,
            proof,
            protocol.max_proof_size,
        )?;
        if assembled.len() as u64 != anchor.operation_count {
            return Err(ProtocolError::CountMismatch {
                expected: anchor.operation_count,
                actual: assembled.len() as u64,
            });
        }

        let mut ops = Vec::with_capacity(assembled.len());
        for (index, request) in assembled {
            let op_type = request.op_type();
            let payload = request
                .to_payload()
                .map_err(|e| ProtocolError::malformed("operation request", e))?;

            // Re-run the request checks; a bad operation is dropped alone.
            let checked = self
                .parser
                .parse(op_type, &payload)
                .and_then(|r| self.parser.unique_suffix(&r));
            let unique_suffix = match checked {
                Ok(s) => s,
                Err(e) => {
                    warn!(
                        anchor = %anchor,
                        index,
                        error = %e,
                        "dropping invalid operation from anchored batch"
                    );
                    continue;
                }
            };

            ops.push(AnchoredOperation {
                unique_suffix,
                op_type,
                namespace: txn.namespace.clone(),
                payload,
                transaction_time: txn.transaction_time,
                transaction_number: txn.transaction_number,
                operation_index: index,
                protocol_genesis_time: txn.protocol_genesis_time,
            });
        }
        Ok(ops)
    }
}

enum Slot<'a> {
    Create(&'a SuffixData),
    Update(&'a SuffixReference),
    Recover(&'a SuffixReference),
    Deactivate(&'a SuffixReference),
}

/// Rebuild requests in batch order from the file set.
///
/// Indices across all references must be exactly `0..count`; deltas are
/// consumed in index order by delta-bearing operations, and every
/// non-create operation must have matching signed data in the proof file.
fn assemble(
    core: &CoreIndexFile,
    provisional: Option<&ProvisionalIndexFile>,
    chunk: ChunkFile,
    proof: ProofFile,
    max_proof_size: usize,
) -> ProtocolResult<Vec<(u32, Request)>> {
    let mut slots: BTreeMap<u32, Slot<'_>> = BTreeMap::new();
    for r in &core.operations.create {
        place(&mut slots, r.index, Slot::Create(&r.suffix_data))?;
    }
    for r in &core.operations.recover {
        place(&mut slots, r.index, Slot::Recover(r))?;
    }
    for r in &core.operations.deactivate {
        place(&mut slots, r.index, Slot::Deactivate(r))?;
    }
    if let Some(p) = provisional {
        for r in &p.operations.update {
            place(&mut slots, r.index, Slot::Update(r))?;
        }
    }

    let count = slots.len();
    if let Some((&last, _)) = slots.last_key_value() {
        if last as usize + 1 != count {
            return Err(ProtocolError::malformed(
                "core index file",
                format!(
                    "operation indices are not contiguous: {count} operations, last index {last}"
                ),
            ));
        }
    }

    let mut proofs: HashMap<u32, SignedData> = HashMap::with_capacity(proof.operations.len());
    for entry in proof.operations {
        let size = serde_json::to_vec(&entry.signed_data)
            .map_err(|e| ProtocolError::malformed("proof file", e))?
            .len();
        if size > max_proof_size {
            return Err(ProtocolError::SizeExceeded {
                what: "proof",
                size,
                max: max_proof_size,
            });
        }
        if proofs.insert(entry.index, entry.signed_data).is_some() {
            return Err(ProtocolError::malformed(
                "proof file",
                format!("duplicate proof for index {}", entry.index),
            ));
        }
    }

    let mut deltas = chunk.deltas.into_iter();
    let missing_delta = |index: u32| {
        ProtocolError::malformed("chunk file", format!("no delta for operation {index}"))
    };

    let mut requests = Vec::with_capacity(count);
    for (index, slot) in slots {
        let signed = if matches!(slot, Slot::Create(_)) {
            None
        } else {
            Some(proofs.remove(&index).ok_or_else(|| {
                ProtocolError::malformed("proof file", format!("no proof for operation {index}"))
            })?)
        };

        let request = match (slot, signed) {
            (Slot::Create(suffix_data), _) => Request::Create(CreateRequest {
                suffix_data: suffix_data.clone(),
                delta: deltas.next().ok_or_else(|| missing_delta(index))?,
            }),
            (Slot::Update(r), Some(SignedData::Update(signed_data))) => {
                Request::Update(UpdateRequest {
                    did_suffix: r.did_suffix.clone(),
                    reveal_value: r.reveal_value.clone(),
                    delta: deltas.next().ok_or_else(|| missing_delta(index))?,
                    signed_data,
                })
            }
            (Slot::Recover(r), Some(SignedData::Recover(signed_data))) => {
                Request::Recover(RecoverRequest {
                    did_suffix: r.did_suffix.clone(),
                    reveal_value: r.reveal_value.clone(),
                    delta: deltas.next().ok_or_else(|| missing_delta(index))?,
                    signed_data,
                })
            }
            (Slot::Deactivate(r), Some(SignedData::Deactivate(signed_data))) => {
                Request::Deactivate(DeactivateRequest {
                    did_suffix: r.did_suffix.clone(),
                    reveal_value: r.reveal_value.clone(),
                    signed_data,
                })
            }
            _ => {
                return Err(ProtocolError::malformed(
                    "proof file",
                    format!("proof type does not match operation {index}"),
                ))
            }
        };
        requests.push((index, request));
    }

    if deltas.next().is_some() {
        return Err(ProtocolError::malformed("chunk file", "more deltas than operations"));
    }
    if !proofs.is_empty() {
        return Err(ProtocolError::malformed("proof file", "proofs without operations"));
    }
    Ok(requests)
}

fn place<'a>(
    slots: &mut BTreeMap<u32, Slot<'a>>,
    index: u32,
    slot: Slot<'a>,
) -> ProtocolResult<()> {
    if slots.insert(index, slot).is_some() {
        return Err(ProtocolError::malformed(
            "core index file",
            format!("duplicate operation index {index}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::V1BatchEncoder;
    use crate::model::{Delta, UpdateRequest};
    use crate::parser::tests::{create, delta, protocol};
    use sidetree_crypto::Multihasher;
    use sidetree_protocol::{BatchEncoder, ZstdCompressor};
    use sidetree_store::{InMemoryCas, StoreError};
    use sidetree_types::{Classify, Operation, OperationType, QueuedOperation};

    fn queued(op_type: OperationType, suffix: &str, request: &Request) -> QueuedOperation {
        let op = Operation::new(
            suffix,
            op_type,
            "did:sidetree",
            request.to_payload().unwrap(),
        )
        .unwrap();
        QueuedOperation::new(op, 0)
    }

    fn txn(anchor: &AnchorString) -> SidetreeTxn {
        SidetreeTxn {
            transaction_time: 7,
            transaction_number: 2,
            anchor_string: anchor.to_string(),
            namespace: "did:sidetree".into(),
            protocol_genesis_time: 0,
        }
    }

    fn parts() -> (Arc<InMemoryCas>, V1BatchEncoder, V1OperationProvider) {
        let cas = Arc::new(InMemoryCas::new());
        let parser = OperationParser::new(protocol(0)).unwrap();
        let encoder = V1BatchEncoder::new(parser.clone(), cas.clone(), Arc::new(ZstdCompressor));
        let provider = V1OperationProvider::new(parser, cas.clone(), Arc::new(ZstdCompressor));
        (cas, encoder, provider)
    }

    #[tokio::test]
    async fn mixed_batch_keeps_queue_order() {
        let h = Multihasher::SHA2_256;
        let (cas, encoder, provider) = parts();

        let c1 = create("u1", "r1");
        let s1 = c1.unique_suffix(&h).unwrap();
        let update = UpdateRequest::new(&h, "existing", "u0", delta("u9")).unwrap();
        let c2 = create("u2", "r2");
        let s2 = c2.unique_suffix(&h).unwrap();
        let deactivate = DeactivateRequest::new("gone", "r0");

        let batch = vec![
            queued(OperationType::Create, &s1, &Request::Create(c1.clone())),
            queued(OperationType::Update, "existing", &Request::Update(update.clone())),
            queued(OperationType::Deactivate, "gone", &Request::Deactivate(deactivate)),
            queued(OperationType::Create, &s2, &Request::Create(c2.clone())),
        ];

        let anchor = encoder.write_batch(&batch).await.unwrap();
        assert_eq!(anchor.operation_count, 4);
        // chunk, proof, provisional, core
        assert_eq!(cas.len(), 4);

        let ops = provider.get_txn_operations(&txn(&anchor)).await.unwrap();
        let order: Vec<_> = ops
            .iter()
            .map(|o| (o.operation_index, o.unique_suffix.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![(0, s1.as_str()), (1, "existing"), (2, "gone"), (3, s2.as_str())]
        );
        assert!(ops.iter().all(|o| o.transaction_time == 7 && o.transaction_number == 2));
        assert_eq!(ops[0].payload, Request::Create(c1).to_payload().unwrap());
        assert_eq!(ops[1].payload, Request::Update(update).to_payload().unwrap());
        assert_eq!(ops[3].op_type, OperationType::Create);
    }

    #[tokio::test]
    async fn deactivate_only_batch_has_no_chunk() {
        let (cas, encoder, provider) = parts();
        let batch = vec![queued(
            OperationType::Deactivate,
            "gone",
            &Request::Deactivate(DeactivateRequest::new("gone", "r0")),
        )];
        let anchor = encoder.write_batch(&batch).await.unwrap();
        // proof + core
        assert_eq!(cas.len(), 2);
        let ops = provider.get_txn_operations(&txn(&anchor)).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op_type, OperationType::Deactivate);
    }

    #[tokio::test]
    async fn encoder_drops_invalid_operations() {
        let (_cas, encoder, _provider) = parts();
        let h = Multihasher::SHA2_256;
        let good = create("u1", "r1");
        let bad =
            Operation::new("x", OperationType::Create, "did:sidetree", b"{}".to_vec()).unwrap();
        let batch = vec![
            QueuedOperation::new(bad, 0),
            queued(
                OperationType::Create,
                &good.unique_suffix(&h).unwrap(),
                &Request::Create(good),
            ),
        ];
        let anchor = encoder.write_batch(&batch).await.unwrap();
        assert_eq!(anchor.operation_count, 1);
    }

    #[tokio::test]
    async fn count_mismatch_is_persistent() {
        let (_cas, encoder, provider) = parts();
        let h = Multihasher::SHA2_256;
        let c = create("u1", "r1");
        let batch = vec![queued(
            OperationType::Create,
            &c.unique_suffix(&h).unwrap(),
            &Request::Create(c),
        )];
        let anchor = encoder.write_batch(&batch).await.unwrap();
        let lying = AnchorString::new(2, anchor.core_index_uri.clone());

        let err = provider.get_txn_operations(&txn(&lying)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::CountMismatch { expected: 2, actual: 1 }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn missing_core_index_is_transient() {
        let (_cas, _encoder, provider) = parts();
        let anchor = AnchorString::new(1, Cid::of(b"never stored").to_string());
        let err = provider.get_txn_operations(&txn(&anchor)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Store(StoreError::ContentNotFound(_))));
        assert!(err.is_transient());
    }

    #[test]
    fn assemble_rejects_gaps_and_leftovers() {
        let c = create("u", "r");
        let mut core = CoreIndexFile::default();
        core.operations.create.push(crate::files::CreateReference {
            index: 1,
            suffix_data: c.suffix_data.clone(),
        });
        let chunk = ChunkFile {
            deltas: vec![c.delta.clone()],
        };
        assert!(assemble(&core, None, chunk, ProofFile::default(), 500).is_err());

        core.operations.create[0].index = 0;
        let chunk = ChunkFile {
            deltas: vec![c.delta.clone(), Delta::new("x", vec![])],
        };
        assert!(assemble(&core, None, chunk, ProofFile::default(), 500).is_err());

        let chunk = ChunkFile {
            deltas: vec![c.delta],
        };
        assert_eq!(assemble(&core, None, chunk, ProofFile::default(), 500).unwrap().len(), 1);
    }
}
