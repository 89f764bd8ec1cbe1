//! Ledger gateway for the Sidetree pipeline.
//!
//! The pipeline consumes a permissioned ledger through narrow interfaces:
//!
//! - [`Ledger`] -- height, block lookup and anchor submission
//! - [`BlockPublisher`] -- best-effort feed of committed blocks
//! - [`OffLedgerStore`] -- private collections used for observer metadata
//!
//! [`InMemoryLedger`] and [`InMemoryOffLedgerStore`] implement these for
//! tests and single-process deployments. A committed block is an ordered
//! list of transactions, each an ordered list of namespaced key/value
//! writes; the write is the only carrier of an anchor record.

pub mod block;
pub mod error;
pub mod memory;
pub mod offledger;
pub mod traits;

pub use block::{Block, BlockHash, BlockchainInfo, KvWrite, Transaction, TxAck, TxEvent};
pub use error::{LedgerError, LedgerResult};
pub use memory::InMemoryLedger;
pub use offledger::{InMemoryOffLedgerStore, OffLedgerStore};
pub use traits::{BlockPublisher, Ledger};
