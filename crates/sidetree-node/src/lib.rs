//! Node wiring for the Sidetree pipeline.
//!
//! A [`SidetreeNode`] is built from a [`NodeConfig`] and a frozen protocol
//! [`Registry`](sidetree_protocol::Registry). Joining a channel creates a
//! [`ChannelController`] which, depending on the peer's roles, runs batch
//! writers, the lease-holding observer and the document cache invalidator
//! for every namespace configured on that channel.

pub mod channel;
pub mod config;
pub mod error;
pub mod loader;
pub mod node;

pub use channel::{ChannelController, ChannelDeps};
pub use config::{ChannelConfig, NamespaceConfig, NodeConfig, ObserverSection};
pub use error::{ConfigError, NodeError, NodeResult};
pub use loader::ResolverLoader;
pub use node::{default_registry, SidetreeNode};
