//! Hashing primitives for the Sidetree ledger pipeline.
//!
//! Sidetree identifies everything by hash: DID suffixes are multihashes of
//! suffix data, commitments are multihashes of reveal values, and every file
//! in a batch is referenced by its content identifier (CID).
//!
//! - [`Multihasher`] -- SHA2-256 multihash with base64url encoding
//! - [`Cid`] -- CIDv1, raw codec, SHA2-256, base32-lower multibase

pub mod cid;
pub mod error;
pub mod multihash;

pub use cid::Cid;
pub use error::{CryptoError, CryptoResult};
pub use multihash::{Multihasher, SHA2_256_CODE};
