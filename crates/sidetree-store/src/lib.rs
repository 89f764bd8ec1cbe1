//! Content-addressed storage and operation stores for the Sidetree pipeline.
//!
//! Two stores sit underneath the pipeline:
//!
//! - the **CAS** holds the immutable batch files (core-index,
//!   provisional-index, chunk, proof), keyed by CID;
//! - the **operation store** holds anchored operations per namespace, keyed
//!   by the content address of each operation so replays are no-ops.
//!
//! # Backends
//!
//! - [`InMemoryCas`] -- `HashMap`-based CAS for tests and embedding
//! - [`InMemoryOperationStore`] -- in-memory operation store
//! - [`SqliteOperationStore`] -- persistent operation store on SQLite
//!
//! # Design Rules
//!
//! 1. CAS objects are immutable once written; a repeated put is free.
//! 2. Operation puts are idempotent by content address.
//! 3. `get(suffix)` always returns operations in ledger order.
//! 4. All I/O errors are propagated and classified, never silently ignored.

pub mod cas;
pub mod error;
pub mod memory;
pub mod opstore;
pub mod sqlite;

pub use cas::{Cas, Link, Node, PutOptions};
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryCas, InMemoryOperationStore};
pub use opstore::{
    operation_key, InMemoryOperationStoreProvider, OperationStore, OperationStoreProvider,
};
pub use sqlite::SqliteOperationStore;
