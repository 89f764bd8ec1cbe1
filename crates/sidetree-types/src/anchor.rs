use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Key prefix of every anchor write on the ledger.
pub const ANCHOR_PREFIX: &str = "sidetreetxn_";

/// Slack allowed on top of the CAS URI length for the count and delimiter.
const ANCHOR_STRING_SLACK: usize = 20;

const DELIMITER: char = '.';

/// Parsed form of `"<count>.<core_index_cid>"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AnchorString {
    pub operation_count: u64,
    pub core_index_uri: String,
}

impl AnchorString {
    pub fn new(operation_count: u64, core_index_uri: impl Into<String>) -> Self {
        Self {
            operation_count,
            core_index_uri: core_index_uri.into(),
        }
    }

    /// Parse and enforce the protocol's `max_cas_uri_length`.
    pub fn parse_with_limit(s: &str, max_cas_uri_length: usize) -> Result<Self, TypeError> {
        let max = max_cas_uri_length + ANCHOR_STRING_SLACK;
        if s.len() > max {
            return Err(TypeError::AnchorStringTooLong {
                actual: s.len(),
                max,
            });
        }
        let parsed: Self = s.parse()?;
        if parsed.core_index_uri.len() > max_cas_uri_length {
            return Err(TypeError::AnchorStringTooLong {
                actual: parsed.core_index_uri.len(),
                max: max_cas_uri_length,
            });
        }
        Ok(parsed)
    }

    /// The ledger key this anchor is written under.
    pub fn ledger_key(&self) -> String {
        format!("{ANCHOR_PREFIX}{self}")
    }
}

impl fmt::Display for AnchorString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{DELIMITER}{}", self.operation_count, self.core_index_uri)
    }
}

impl FromStr for AnchorString {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| TypeError::InvalidAnchorString(s.to_string(), reason);

        let (count, uri) = s
            .split_once(DELIMITER)
            .ok_or_else(|| invalid("missing delimiter"))?;

        if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("operation count is not a decimal number"));
        }
        let operation_count: u64 = count
            .parse()
            .map_err(|_| invalid("operation count out of range"))?;
        if operation_count == 0 {
            return Err(invalid("operation count must be positive"));
        }

        if uri.is_empty() {
            return Err(invalid("missing core index URI"));
        }
        if !uri.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(invalid("core index URI is not base58 or base32"));
        }

        Ok(Self::new(operation_count, uri))
    }
}

/// The value written to the ledger for each anchored batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub anchor_string: String,
    pub namespace: String,
    pub protocol_genesis_time: u64,
}

impl AnchorRecord {
    pub fn new(
        anchor: &AnchorString,
        namespace: impl Into<String>,
        protocol_genesis_time: u64,
    ) -> Self {
        Self {
            anchor_string: anchor.to_string(),
            namespace: namespace.into(),
            protocol_genesis_time,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, TypeError> {
        serde_json::to_vec(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, TypeError> {
        serde_json::from_slice(bytes).map_err(|e| TypeError::Serialization(e.to_string()))
    }
}

/// An anchor observed on the ledger at a specific (block, tx) position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidetreeTxn {
    /// Block number.
    pub transaction_time: u64,
    /// Transaction number within the block.
    pub transaction_number: u64,
    pub anchor_string: String,
    pub namespace: String,
    pub protocol_genesis_time: u64,
}

impl SidetreeTxn {
    pub fn from_record(
        record: AnchorRecord,
        transaction_time: u64,
        transaction_number: u64,
    ) -> Self {
        Self {
            transaction_time,
            transaction_number,
            anchor_string: record.anchor_string,
            namespace: record.namespace,
            protocol_genesis_time: record.protocol_genesis_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CID: &str = "bafkreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy";

    #[test]
    fn build_and_parse() {
        let anchor = AnchorString::new(3, CID);
        let s = anchor.to_string();
        assert_eq!(s, format!("3.{CID}"));
        assert_eq!(s.parse::<AnchorString>().unwrap(), anchor);
    }

    #[test]
    fn ledger_key_has_prefix() {
        let anchor = AnchorString::new(1, CID);
        assert_eq!(anchor.ledger_key(), format!("sidetreetxn_1.{CID}"));
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "1", ".abc", "1.", "x.abc", "0.abc", "-1.abc", "1.ab/c", "1.a.b"] {
            assert!(bad.parse::<AnchorString>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn enforces_length_limit() {
        let s = format!("10.{CID}");
        assert!(AnchorString::parse_with_limit(&s, CID.len()).is_ok());
        assert!(matches!(
            AnchorString::parse_with_limit(&s, CID.len() - 1),
            Err(TypeError::AnchorStringTooLong { .. })
        ));
        let long = format!("1.{}", "a".repeat(200));
        assert!(matches!(
            AnchorString::parse_with_limit(&long, 100),
            Err(TypeError::AnchorStringTooLong { .. })
        ));
    }

    #[test]
    fn record_json_is_bit_exact() {
        let record = AnchorRecord::new(&AnchorString::new(2, "QmXyz"), "did:sidetree", 100);
        let json = String::from_utf8(record.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"anchor_string":"2.QmXyz","namespace":"did:sidetree","protocol_genesis_time":100}"#
        );
        assert_eq!(AnchorRecord::from_json(json.as_bytes()).unwrap(), record);
    }

    #[test]
    fn record_rejects_garbage() {
        assert!(AnchorRecord::from_json(b"not json").is_err());
    }

    proptest! {
        #[test]
        fn parse_inverts_build(count in 1u64.., uri in "[a-z2-7]{1,64}") {
            let s = AnchorString::new(count, uri.clone()).to_string();
            let parsed: AnchorString = s.parse().unwrap();
            prop_assert_eq!(parsed.operation_count, count);
            prop_assert_eq!(parsed.core_index_uri, uri);
        }
    }
}
