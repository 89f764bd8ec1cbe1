//! Foundation types for the Sidetree ledger pipeline.
//!
//! This crate provides the data model shared by every stage of the
//! anchor-to-document pipeline: the operation queue, the batch writer, the
//! observer and the operation store. Every other `sidetree-*` crate depends
//! on `sidetree-types`.
//!
//! # Key Types
//!
//! - [`Operation`] -- a client request to mutate one DID
//! - [`QueuedOperation`] -- an operation accepted under a protocol version
//! - [`AnchoredOperation`] -- an operation attributed to a ledger position
//! - [`AnchorString`] / [`AnchorRecord`] -- the single ledger record per batch
//! - [`SidetreeTxn`] -- an anchor observed at a (block, tx) position
//! - [`ObserverMetadata`] -- per-owner observer progress record
//! - [`ErrorCode`] / [`Classify`] -- retry classification shared by all errors

pub mod anchor;
pub mod error;
pub mod metadata;
pub mod operation;

mod serde_bytes;

pub use anchor::{AnchorRecord, AnchorString, SidetreeTxn, ANCHOR_PREFIX};
pub use error::{Classify, ErrorCode, TypeError};
pub use metadata::ObserverMetadata;
pub use operation::{AnchoredOperation, Operation, OperationType, QueuedOperation};
