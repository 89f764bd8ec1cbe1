//! Protocol versioning for the Sidetree pipeline.
//!
//! A protocol version is a bundle of function objects -- transaction
//! processor, operation provider, operation validator, compressor and batch
//! encoder -- built from a [`Protocol`] parameter set. Versions are produced
//! by factories registered once at startup:
//!
//! ```text
//! RegistryBuilder::register("1.0", factory)  -- duplicates are fatal
//!         │ build()
//!         ▼
//!     Registry (frozen) ── create(version, protocol, cas, op_store, doc_type) ──► Version
//!                                                                                  │
//!                                       ProtocolClient (per namespace) ◄───────────┘
//!                                       get(time): latest version with genesis_time ≤ time
//! ```

pub mod client;
pub mod compression;
pub mod error;
pub mod params;
pub mod registry;
pub mod version;

#[cfg(test)]
mod test_support;

pub use client::{ProtocolClient, ProtocolClientProvider};
pub use compression::{
    compressor_for, Compressor, GzipCompressor, NoopCompressor, ZstdCompressor,
};
pub use error::{ProtocolError, ProtocolResult};
pub use params::{load_protocol_file, parse_protocol_params, Protocol};
pub use registry::{version_matches, Registry, RegistryBuilder, VersionFactory};
pub use version::{
    BatchEncoder, DocumentType, OperationProvider, OperationValidator, TransactionProcessor,
    Version,
};
