//! Version 1 of the Sidetree protocol.
//!
//! Everything a [`Version`](sidetree_protocol::Version) needs for the 1.x
//! parameter sets:
//!
//! - [`OperationParser`] -- request decoding and per-request checks
//! - [`V1OperationValidator`] -- front-door validation before queueing
//! - [`V1BatchEncoder`] -- batch to chunk / proof / provisional / core files
//! - [`V1OperationProvider`] -- anchor to operations, via CAS
//! - [`OperationFilter`] -- commitment checks against the operation store
//! - [`V1TransactionProcessor`] -- provider, filter, store
//! - [`Factory`] -- the [`VersionFactory`](sidetree_protocol::VersionFactory)
//!   registered under [`VERSION`]

pub mod encoder;
pub mod factory;
pub mod files;
pub mod filter;
pub mod model;
pub mod parser;
pub mod processor;
pub mod provider;
pub mod validator;

pub use encoder::V1BatchEncoder;
pub use factory::{default_protocol, Factory, VERSION};
pub use files::{ChunkFile, CoreIndexFile, ProofFile, ProvisionalIndexFile};
pub use filter::{fold, DocumentResolver, DocumentState, OperationFilter};
pub use model::{
    CreateRequest, DeactivateRequest, Delta, RecoverRequest, Request, SignedData, SuffixData,
    UpdateRequest,
};
pub use parser::OperationParser;
pub use processor::V1TransactionProcessor;
pub use provider::V1OperationProvider;
pub use validator::V1OperationValidator;
