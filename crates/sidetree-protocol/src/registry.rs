use std::collections::BTreeMap;
use std::sync::Arc;

use sidetree_store::{Cas, OperationStore};
use tracing::info;

use crate::error::{ProtocolError, ProtocolResult};
use crate::params::Protocol;
use crate::version::{DocumentType, Version};

/// Builds the runtime [`Version`] for one registered protocol version.
pub trait VersionFactory: Send + Sync {
    fn create(
        &self,
        version: &str,
        protocol: Protocol,
        cas: Arc<dyn Cas>,
        op_store: Arc<dyn OperationStore>,
        doc_type: DocumentType,
    ) -> ProtocolResult<Version>;
}

/// `true` if `version` falls under the registered key `registered`.
///
/// Components are compared on `.` boundaries: `"1.0"` matches `"1.0"` and
/// `"1.0.3"` but not `"1.01"` or `"1"`.
pub fn version_matches(registered: &str, version: &str) -> bool {
    let mut wanted = version.split('.');
    registered
        .split('.')
        .all(|component| wanted.next() == Some(component))
}

/// Collects factories during startup.
#[derive(Default)]
pub struct RegistryBuilder {
    factories: BTreeMap<String, Arc<dyn VersionFactory>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `version`. Registering a version twice is a
    /// configuration error.
    pub fn register(
        &mut self,
        version: impl Into<String>,
        factory: Arc<dyn VersionFactory>,
    ) -> ProtocolResult<&mut Self> {
        let version = version.into();
        if self.factories.contains_key(&version) {
            return Err(ProtocolError::DuplicateVersion(version));
        }
        info!(version = %version, "registering protocol version factory");
        self.factories.insert(version, factory);
        Ok(self)
    }

    /// Freeze the registry.
    pub fn build(self) -> Registry {
        Registry {
            factories: Arc::new(self.factories),
        }
    }
}

/// Immutable registry of version factories, cheap to clone.
#[derive(Clone)]
pub struct Registry {
    factories: Arc<BTreeMap<String, Arc<dyn VersionFactory>>>,
}

impl Registry {
    /// Registered version keys, in order.
    pub fn versions(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiate `version` with the given parameters and collaborators.
    pub fn create(
        &self,
        version: &str,
        protocol: Protocol,
        cas: Arc<dyn Cas>,
        op_store: Arc<dyn OperationStore>,
        doc_type: DocumentType,
    ) -> ProtocolResult<Version> {
        let factory = self.resolve(version)?;
        protocol.validate()?;
        info!(
            version,
            genesis_time = protocol.genesis_time,
            %doc_type,
            "creating protocol version"
        );
        factory.create(version, protocol, cas, op_store, doc_type)
    }

    /// The factory registered under the most specific key matching `version`.
    fn resolve(&self, version: &str) -> ProtocolResult<&Arc<dyn VersionFactory>> {
        self.factories
            .iter()
            .filter(|(key, _)| version_matches(key, version))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, factory)| factory)
            .ok_or_else(|| ProtocolError::UnknownVersion(version.to_string()))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("versions", &self.versions())
            .finish()
    }
}
