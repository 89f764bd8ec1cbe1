use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};
use crate::multihash::{Multihasher, SHA2_256_CODE};

const CID_V1: u8 = 0x01;
const RAW_CODEC: u8 = 0x55;
const BASE32_LOWER_PREFIX: char = 'b';
const CID_V0_PREFIX: &str = "Qm";
const CID_V0_LEN: usize = 46;

/// Content identifier of a CAS object.
///
/// Newly computed identifiers are CIDv1 with the raw codec and a SHA2-256
/// multihash, rendered as base32-lower multibase (`b...`). Legacy base58
/// CIDv0 strings (`Qm...`) are accepted when parsing but cannot be
/// recomputed locally.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid(String);

impl Cid {
    /// Compute the CID of `data`.
    pub fn of(data: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(36);
        bytes.push(CID_V1);
        bytes.push(RAW_CODEC);
        bytes.extend_from_slice(&Multihasher::SHA2_256.hash(data));
        let encoded = BASE32_NOPAD.encode(&bytes).to_ascii_lowercase();
        Self(format!("{BASE32_LOWER_PREFIX}{encoded}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` if `data` hashes to this CID.
    pub fn verify(&self, data: &[u8]) -> bool {
        self.is_v1() && Self::of(data) == *self
    }

    pub fn is_v1(&self) -> bool {
        self.0.starts_with(BASE32_LOWER_PREFIX)
    }

    fn validate_v1(s: &str) -> CryptoResult<()> {
        let body = &s[BASE32_LOWER_PREFIX.len_utf8()..];
        let bytes = BASE32_NOPAD
            .decode(body.to_ascii_uppercase().as_bytes())
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;
        if bytes.len() < 4 || bytes[0] != CID_V1 {
            return Err(CryptoError::Encoding(format!("not a CIDv1: {s}")));
        }
        if u64::from(bytes[2]) != SHA2_256_CODE {
            return Err(CryptoError::UnsupportedAlgorithm(u64::from(bytes[2])));
        }
        if bytes[3] as usize != bytes.len() - 4 {
            return Err(CryptoError::MalformedMultihash(s.to_string()));
        }
        Ok(())
    }
}

impl FromStr for Cid {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with(BASE32_LOWER_PREFIX) {
            Self::validate_v1(s)?;
            return Ok(Self(s.to_string()));
        }
        if s.starts_with(CID_V0_PREFIX)
            && s.len() == CID_V0_LEN
            && s.bytes()
                .all(|b| b.is_ascii_alphanumeric() && !matches!(b, b'0' | b'O' | b'I' | b'l'))
        {
            return Ok(Self(s.to_string()));
        }
        Err(CryptoError::Encoding(format!("unrecognized CID: {s}")))
    }
}

impl TryFrom<String> for Cid {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cid> for String {
    fn from(cid: Cid) -> Self {
        cid.0
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.0)
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
