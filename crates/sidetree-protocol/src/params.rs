use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sidetree_crypto::Multihasher;
use tracing::debug;

use crate::compression::compressor_for;
use crate::error::{ProtocolError, ProtocolResult};

/// The only supported hash algorithm name.
pub const SHA256: &str = "SHA256";

/// Parameters of one protocol version.
///
/// Missing fields deserialize to zero/empty and are caught by
/// [`Protocol::validate`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Protocol {
    /// First block at which this version is authoritative.
    pub genesis_time: u64,
    #[serde(alias = "hashAlgorithmInMultihashCode")]
    pub multihash_algorithm: u64,
    pub hash_algorithm: String,
    pub max_operation_count: usize,
    pub max_operation_size: usize,
    pub compression_algorithm: String,
    pub max_core_index_file_size: usize,
    pub max_provisional_index_file_size: usize,
    pub max_chunk_file_size: usize,
    pub max_proof_file_size: usize,
    pub max_delta_size: usize,
    pub max_proof_size: usize,
    pub max_cas_uri_length: usize,
    pub max_operation_hash_length: usize,
    pub signature_algorithms: Vec<String>,
    pub key_algorithms: Vec<String>,
    pub patches: Vec<String>,
}

impl Protocol {
    /// Reject parameter sets the pipeline cannot run under.
    pub fn validate(&self) -> ProtocolResult<()> {
        Multihasher::for_code(self.multihash_algorithm)?;

        if self.hash_algorithm != SHA256 {
            return Err(invalid(
                "hashAlgorithm",
                format!("unsupported hash algorithm '{}'", self.hash_algorithm),
            ));
        }
        if self.compression_algorithm.is_empty() {
            return Err(invalid("compressionAlgorithm", "cannot be empty"));
        }
        compressor_for(&self.compression_algorithm)?;

        let sizes = [
            ("maxOperationCount", self.max_operation_count),
            ("maxOperationSize", self.max_operation_size),
            ("maxCoreIndexFileSize", self.max_core_index_file_size),
            ("maxProvisionalIndexFileSize", self.max_provisional_index_file_size),
            ("maxChunkFileSize", self.max_chunk_file_size),
            ("maxProofFileSize", self.max_proof_file_size),
            ("maxDeltaSize", self.max_delta_size),
            ("maxProofSize", self.max_proof_size),
            ("maxCasUriLength", self.max_cas_uri_length),
            ("maxOperationHashLength", self.max_operation_hash_length),
        ];
        for (field, value) in sizes {
            if value == 0 {
                return Err(invalid(field, "must contain a value greater than 0"));
            }
        }

        let lists = [
            ("signatureAlgorithms", &self.signature_algorithms),
            ("keyAlgorithms", &self.key_algorithms),
            ("patches", &self.patches),
        ];
        for (field, list) in lists {
            if list.is_empty() {
                return Err(invalid(field, "cannot be empty"));
            }
        }
        Ok(())
    }

    pub fn multihasher(&self) -> ProtocolResult<Multihasher> {
        Ok(Multihasher::for_code(self.multihash_algorithm)?)
    }

    /// Upper bound on the serialized size of a batch of `count` operations.
    pub fn max_batch_size(&self, count: usize) -> usize {
        self.max_operation_size.saturating_mul(count)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidParameter {
        field,
        reason: reason.into(),
    }
}

/// Parse and validate a protocol parameter document: a JSON object mapping
/// version string to [`Protocol`].
pub fn parse_protocol_params(json: &[u8]) -> ProtocolResult<BTreeMap<String, Protocol>> {
    let params: BTreeMap<String, Protocol> =
        serde_json::from_slice(json).map_err(|e| ProtocolError::malformed("protocol file", e))?;
    if params.is_empty() {
        return Err(ProtocolError::malformed("protocol file", "no versions defined"));
    }
    for (version, protocol) in &params {
        protocol.validate()?;
        debug!(version, genesis_time = protocol.genesis_time, "validated protocol version");
    }
    Ok(params)
}

/// Load a protocol parameter file from disk.
pub fn load_protocol_file(path: impl AsRef<Path>) -> ProtocolResult<BTreeMap<String, Protocol>> {
    let bytes = fs::read(path.as_ref())?;
    parse_protocol_params(&bytes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sidetree_crypto::CryptoError;

    pub(crate) fn sample(genesis_time: u64) -> Protocol {
        Protocol {
            genesis_time,
            multihash_algorithm: 18,
            hash_algorithm: SHA256.into(),
            max_operation_count: 10,
            max_operation_size: 2_000,
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
            patches: vec!["add-public-keys".into(), "replace".into()],
        }
    }

    #[test]
    fn sample_is_valid() {
        sample(0).validate().unwrap();
    }

    #[test]
    fn gzip_parameter_set_is_valid() {
        let mut p = sample(0);
        p.compression_algorithm = "GZIP".into();
        p.validate().unwrap();
    }

    #[test]
    fn rejects_unknown_multihash() {
        let mut p = sample(0);
        p.multihash_algorithm = 2777;
        assert!(matches!(
            p.validate(),
            Err(ProtocolError::Crypto(CryptoError::UnsupportedAlgorithm(2777)))
        ));
    }

    #[test]
    fn rejects_unknown_hash_and_compression() {
        let mut p = sample(0);
        p.hash_algorithm = "MD5".into();
        assert!(matches!(
            p.validate(),
            Err(ProtocolError::InvalidParameter { field: "hashAlgorithm", .. })
        ));

        let mut p = sample(0);
        p.compression_algorithm = "LZMA".into();
        assert!(matches!(
            p.validate(),
            Err(ProtocolError::UnsupportedCompression(_))
        ));
    }

    #[test]
    fn rejects_zero_sizes_and_empty_lists() {
        let mut p = sample(0);
        p.max_operation_count = 0;
        assert!(matches!(
            p.validate(),
            Err(ProtocolError::InvalidParameter { field: "maxOperationCount", .. })
        ));

        let mut p = sample(0);
        p.max_proof_file_size = 0;
        assert!(matches!(
            p.validate(),
            Err(ProtocolError::InvalidParameter { field: "maxProofFileSize", .. })
        ));

        let mut p = sample(0);
        p.patches.clear();
        assert!(matches!(
            p.validate(),
            Err(ProtocolError::InvalidParameter { field: "patches", .. })
        ));
    }

    #[test]
    fn parses_version_map() {
        let mut file = BTreeMap::new();
        file.insert("1.0".to_string(), sample(0));
        file.insert("1.1".to_string(), sample(500));
        let json = serde_json::to_vec(&file).unwrap();

        let parsed = parse_protocol_params(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["1.1"].genesis_time, 500);
        assert!(String::from_utf8(json).unwrap().contains("\"maxOperationCount\":10"));
    }

    #[test]
    fn accepts_legacy_multihash_field_name() {
        let json = br#"{"genesisTime":500,"hashAlgorithmInMultihashCode":18}"#;
        let p: Protocol = serde_json::from_slice(json).unwrap();
        assert_eq!(p.multihash_algorithm, 18);
        assert_eq!(p.genesis_time, 500);
        // Everything else defaulted, so validation must fail.
        assert!(p.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protocol.json");
        let mut file = BTreeMap::new();
        file.insert("1.0".to_string(), sample(0));
        fs::write(&path, serde_json::to_vec_pretty(&file).unwrap()).unwrap();

        let parsed = load_protocol_file(&path).unwrap();
        assert_eq!(parsed["1.0"], sample(0));
        assert!(load_protocol_file(dir.path().join("missing.json")).is_err());
    }
}
