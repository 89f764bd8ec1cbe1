use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, CryptoResult};

/// Multicodec code for SHA2-256.
pub const SHA2_256_CODE: u64 = 0x12;

const SHA2_256_LEN: u8 = 32;

/// SHA2-256 multihasher.
///
/// A multihash is `<code><length><digest>`. Sidetree encodes multihashes as
/// unpadded base64url strings wherever they appear in JSON (suffixes,
/// commitments, delta hashes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Multihasher {
    code: u64,
}

impl Multihasher {
    pub const SHA2_256: Self = Self {
        code: SHA2_256_CODE,
    };

    /// Hasher for a protocol's `multihash_algorithm` code.
    pub fn for_code(code: u64) -> CryptoResult<Self> {
        match code {
            SHA2_256_CODE => Ok(Self::SHA2_256),
            other => Err(CryptoError::UnsupportedAlgorithm(other)),
        }
    }

    pub fn code(&self) -> u64 {
        self.code
    }

    /// Raw SHA2-256 digest.
    pub fn digest(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    /// Multihash bytes of `data`.
    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + SHA2_256_LEN as usize);
        out.push(self.code as u8);
        out.push(SHA2_256_LEN);
        out.extend_from_slice(&Self::digest(data));
        out
    }

    /// Base64url-encoded multihash of `data`.
    pub fn hash_encoded(&self, data: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(self.hash(data))
    }

    /// Base64url-encoded multihash of the JSON serialization of `value`.
    ///
    /// Serialization order is the struct field order, which makes the result
    /// deterministic for the typed models in this workspace.
    pub fn hash_json<T: serde::Serialize>(&self, value: &T) -> CryptoResult<String> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| CryptoError::Serialization(e.to_string()))?;
        Ok(self.hash_encoded(&bytes))
    }

    /// Commitment for a reveal value: the encoded multihash of its bytes.
    pub fn commitment(&self, reveal_value: &str) -> String {
        self.hash_encoded(reveal_value.as_bytes())
    }

    /// `true` if `reveal_value` opens `commitment`.
    pub fn reveals(&self, reveal_value: &str, commitment: &str) -> bool {
        self.commitment(reveal_value) == commitment
    }

    /// Check that an encoded value is a well-formed multihash of this algorithm.
    pub fn validate_encoded(&self, encoded: &str) -> CryptoResult<()> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;
        if bytes.len() < 2 {
            return Err(CryptoError::MalformedMultihash("too short".into()));
        }
        if u64::from(bytes[0]) != self.code {
            return Err(CryptoError::UnsupportedAlgorithm(u64::from(bytes[0])));
        }
        if bytes[1] as usize != bytes.len() - 2 {
            return Err(CryptoError::MalformedMultihash(format!(
                "declared length {} but digest is {} bytes",
                bytes[1],
                bytes.len() - 2
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let h = Multihasher::SHA2_256;
        assert_eq!(h.hash_encoded(b"data"), h.hash_encoded(b"data"));
        assert_ne!(h.hash_encoded(b"data"), h.hash_encoded(b"other"));
    }

    #[test]
    fn multihash_prefix() {
        let mh = Multihasher::SHA2_256.hash(b"x");
        assert_eq!(mh[0], 0x12);
        assert_eq!(mh[1], 32);
        assert_eq!(mh.len(), 34);
    }

    #[test]
    fn unknown_code_rejected() {
        assert_eq!(
            Multihasher::for_code(0x13),
            Err(CryptoError::UnsupportedAlgorithm(0x13))
        );
        assert!(Multihasher::for_code(18).is_ok());
    }

    #[test]
    fn commitment_reveal() {
        let h = Multihasher::SHA2_256;
        let c = h.commitment("secret");
        assert!(h.reveals("secret", &c));
        assert!(!h.reveals("guess", &c));
    }

    #[test]
    fn validate_encoded_checks_shape() {
        let h = Multihasher::SHA2_256;
        assert!(h.validate_encoded(&h.hash_encoded(b"x")).is_ok());
        assert!(h.validate_encoded("!!").is_err());
        assert!(h.validate_encoded("AA").is_err());
    }

    #[test]
    fn hash_json_matches_bytes() {
        let h = Multihasher::SHA2_256;
        let value = serde_json::json!({"a": 1});
        let expected = h.hash_encoded(&serde_json::to_vec(&value).unwrap());
        assert_eq!(h.hash_json(&value).unwrap(), expected);
    }
}
