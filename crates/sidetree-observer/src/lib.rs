//! Ledger observer for the Sidetree pipeline.
//!
//! ```text
//!      block feed ──► Notifier
//!                         │ TxEvent
//!                         ▼
//!   timer ──► Observer listener ── trigger (1 slot) ──► processor task
//!                                                              │
//!                          BlockProcessor::process_blockchain  │
//!                                                              │
//!  for block in resume..=height-1 (numeric order):             │
//!      anchor writes ── Behavior::process_txn ─────────────────┘
//!      save metadata
//! ```
//!
//! Two behaviours share the block processor:
//!
//! - [`ObserverBehavior`] applies operations to the operation store. Its
//!   progress is kept off-ledger and one peer per organization holds the
//!   lease for each block ([`LeaseProvider`]).
//! - [`InvalidatorBehavior`] marks document-cache entries stale on every
//!   peer, with in-memory progress.

pub mod cache;
pub mod error;
pub mod invalidator;
pub mod lease;
pub mod membership;
pub mod metadata;
pub mod notifier;
pub mod observer;
pub mod processor;

pub use cache::{DocumentCache, DocumentCacheRegistry, DocumentLoader, DEFAULT_CACHE_SIZE};
pub use error::{ObserverError, ObserverResult};
pub use invalidator::InvalidatorBehavior;
pub use lease::{Lease, LeaseProvider};
pub use membership::{Member, Membership, Role, StaticMembership};
pub use metadata::{
    metadata_key, InMemoryMetadataStore, MetadataStore, OffLedgerMetadataStore, METADATA_COLLECTION,
};
pub use notifier::{anchor_events, Notifier};
pub use observer::{Observer, ObserverBehavior, DEFAULT_PERIOD};
pub use processor::{Behavior, BlockProcessor, ProcessorConfig, DEFAULT_MAX_ATTEMPTS};
