use std::sync::Arc;

use sidetree_protocol::{
    compressor_for, DocumentType, Protocol, ProtocolResult, Version, VersionFactory,
};
use sidetree_crypto::SHA2_256_CODE;
use sidetree_store::{Cas, OperationStore};
use tracing::debug;

use crate::encoder::V1BatchEncoder;
use crate::filter::OperationFilter;
use crate::parser::OperationParser;
use crate::processor::V1TransactionProcessor;
use crate::provider::V1OperationProvider;
use crate::validator::V1OperationValidator;

/// Version key this crate registers under.
pub const VERSION: &str = "1.0";

/// A complete version 1 parameter set with conventional limits.
pub fn default_protocol(genesis_time: u64) -> Protocol {
    Protocol {
        genesis_time,
        multihash_algorithm: SHA2_256_CODE,
        hash_algorithm: "SHA256".into(),
        max_operation_count: 100,
        max_operation_size: 2_500,
        compression_algorithm: "ZSTD".into(),
        max_core_index_file_size: 1_000_000,
        max_provisional_index_file_size: 1_000_000,
        max_chunk_file_size: 10_000_000,
        max_proof_file_size: 2_500_000,
        max_delta_size: 1_000,
        max_proof_size: 500,
        max_cas_uri_length: 100,
        max_operation_hash_length: 100,
        signature_algorithms: vec!["EdDSA".into(), "ES256K".into()],
        key_algorithms: vec!["Ed25519".into(), "secp256k1".into()],
        patches: [
            "add-public-keys",
            "remove-public-keys",
            "add-services",
            "remove-services",
            "ietf-json-patch",
            "replace",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
    }
}

/// Builds version 1 function objects for a parameter set.
#[derive(Clone, Copy, Debug, Default)]
pub struct Factory;

impl VersionFactory for Factory {
    fn create(
        &self,
        version: &str,
        protocol: Protocol,
        cas: Arc<dyn Cas>,
        op_store: Arc<dyn OperationStore>,
        doc_type: DocumentType,
    ) -> ProtocolResult<Version> {
        let parser = OperationParser::new(protocol.clone())?;
        let compressor = compressor_for(&protocol.compression_algorithm)?;

        let provider = Arc::new(V1OperationProvider::new(
            parser.clone(),
            Arc::clone(&cas),
            Arc::clone(&compressor),
        ));
        let processor = V1TransactionProcessor::new(
            provider.clone(),
            OperationFilter::new(parser.clone(), Arc::clone(&op_store)),
            op_store,
        );
        let validator = V1OperationValidator::new(parser.clone());
        let encoder = V1BatchEncoder::new(parser, cas, Arc::clone(&compressor));

        debug!(
            version,
            genesis_time = protocol.genesis_time,
            doc_type = %doc_type,
            compression = compressor.algorithm(),
            "created protocol version"
        );
        Ok(Version::new(
            version,
            protocol,
            doc_type,
            Arc::new(processor),
            provider,
            Arc::new(validator),
            compressor,
            Arc::new(encoder),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Request;
    use crate::parser::tests::{create, protocol};
    use sidetree_crypto::Multihasher;
    use sidetree_protocol::{ProtocolError, RegistryBuilder};
    use sidetree_store::{InMemoryCas, InMemoryOperationStore};
    use sidetree_types::{Operation, OperationType, QueuedOperation, SidetreeTxn};

    #[tokio::test]
    async fn registered_factory_builds_working_version() {
        let mut builder = RegistryBuilder::new();
        builder.register(VERSION, Arc::new(Factory)).unwrap();
        let registry = builder.build();

        let store = Arc::new(InMemoryOperationStore::new());
        let version = registry
            .create(
                "1.0.2",
                protocol(5),
                Arc::new(InMemoryCas::new()),
                store.clone(),
                DocumentType::DidDocument,
            )
            .unwrap();
        assert_eq!(version.version(), "1.0.2");
        assert_eq!(version.genesis_time(), 5);
        assert_eq!(version.compressor().algorithm(), "ZSTD");

        let c = create("u1", "r1");
        let suffix = c.unique_suffix(&Multihasher::SHA2_256).unwrap();
        let op = Operation::new(
            &suffix,
            OperationType::Create,
            "did:sidetree",
            Request::Create(c).to_payload().unwrap(),
        )
        .unwrap();
        version.operation_validator().validate(&op).unwrap();

        let anchor = version
            .batch_encoder()
            .write_batch(&[QueuedOperation::new(op, 5)])
            .await
            .unwrap();
        let txn = SidetreeTxn {
            transaction_time: 9,
            transaction_number: 1,
            anchor_string: anchor.to_string(),
            namespace: "did:sidetree".into(),
            protocol_genesis_time: 5,
        };
        assert_eq!(version.transaction_processor().process(&txn).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn default_protocol_is_valid() {
        default_protocol(0).validate().unwrap();
        assert_eq!(default_protocol(42).genesis_time, 42);
    }

    #[test]
    fn unknown_compression_is_rejected() {
        let mut p = protocol(0);
        p.compression_algorithm = "LZ4".into();
        let err = Factory
            .create(
                VERSION,
                p,
                Arc::new(InMemoryCas::new()),
                Arc::new(InMemoryOperationStore::new()),
                DocumentType::DidDocument,
            )
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedCompression(_)));
    }
}
