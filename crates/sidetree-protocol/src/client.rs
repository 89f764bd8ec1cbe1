use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use sidetree_store::{Cas, OperationStore};
use tracing::debug;

use crate::error::{ProtocolError, ProtocolResult};
use crate::params::Protocol;
use crate::registry::Registry;
use crate::version::{DocumentType, Version};

/// The protocol versions of one namespace, ordered by genesis time.
#[derive(Debug)]
pub struct ProtocolClient {
    namespace: String,
    versions: Vec<Arc<Version>>,
}

impl ProtocolClient {
    /// Build a client from already-created versions.
    ///
    /// At least one version is required and genesis times must be distinct.
    pub fn new(namespace: impl Into<String>, mut versions: Vec<Version>) -> ProtocolResult<Self> {
        let namespace = namespace.into();
        if versions.is_empty() {
            return Err(ProtocolError::NamespaceNotConfigured(namespace));
        }
        versions.sort_by_key(Version::genesis_time);
        for pair in versions.windows(2) {
            if pair[0].genesis_time() == pair[1].genesis_time() {
                return Err(ProtocolError::InvalidParameter {
                    field: "genesisTime",
                    reason: format!(
                        "versions {} and {} share genesis time {}",
                        pair[0].version(),
                        pair[1].version(),
                        pair[0].genesis_time()
                    ),
                });
            }
        }
        Ok(Self {
            namespace,
            versions: versions.into_iter().map(Arc::new).collect(),
        })
    }

    /// Create every version in `params` through `registry`.
    pub fn from_params(
        namespace: impl Into<String>,
        registry: &Registry,
        params: &BTreeMap<String, Protocol>,
        cas: Arc<dyn Cas>,
        op_store: Arc<dyn OperationStore>,
        doc_type: DocumentType,
    ) -> ProtocolResult<Self> {
        let versions = params
            .iter()
            .map(|(version, protocol)| {
                registry.create(
                    version,
                    protocol.clone(),
                    Arc::clone(&cas),
                    Arc::clone(&op_store),
                    doc_type,
                )
            })
            .collect::<ProtocolResult<Vec<_>>>()?;
        Self::new(namespace, versions)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn versions(&self) -> &[Arc<Version>] {
        &self.versions
    }

    /// The latest version whose genesis time is at or before `time`.
    pub fn get(&self, time: u64) -> ProtocolResult<Arc<Version>> {
        self.versions
            .iter()
            .rev()
            .find(|v| v.genesis_time() <= time)
            .cloned()
            .ok_or_else(|| ProtocolError::NoVersionAt {
                namespace: self.namespace.clone(),
                time,
            })
    }

    /// The version whose genesis time is exactly `genesis_time`.
    pub fn get_by_genesis(&self, genesis_time: u64) -> ProtocolResult<Arc<Version>> {
        self.versions
            .iter()
            .find(|v| v.genesis_time() == genesis_time)
            .cloned()
            .ok_or(ProtocolError::UnknownGenesisTime(genesis_time))
    }

    /// The version new operations are accepted under at ledger `height`.
    pub fn current(&self, height: u64) -> ProtocolResult<Arc<Version>> {
        let version = self.get(height)?;
        debug!(
            namespace = %self.namespace,
            height,
            version = version.version(),
            "resolved current protocol version"
        );
        Ok(version)
    }
}

/// Maps namespace to protocol client.
#[derive(Debug, Default, Clone)]
pub struct ProtocolClientProvider {
    clients: HashMap<String, Arc<ProtocolClient>>,
}

impl ProtocolClientProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, client: ProtocolClient) -> Arc<ProtocolClient> {
        let client = Arc::new(client);
        self.clients
            .insert(client.namespace().to_string(), Arc::clone(&client));
        client
    }

    pub fn for_namespace(&self, namespace: &str) -> ProtocolResult<Arc<ProtocolClient>> {
        self.clients
            .get(namespace)
            .cloned()
            .ok_or_else(|| ProtocolError::NamespaceNotConfigured(namespace.to_string()))
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::tests::sample;
    use crate::registry::RegistryBuilder;
    use crate::test_support::{stub_stores, StubFactory};

    fn client(genesis: &[(&str, u64)]) -> ProtocolClient {
        let mut builder = RegistryBuilder::new();
        builder.register("1.0", Arc::new(StubFactory)).unwrap();
        builder.register("1.1", Arc::new(StubFactory)).unwrap();
        let registry = builder.build();
        let (cas, store) = stub_stores();

        let params: BTreeMap<String, Protocol> = genesis
            .iter()
            .map(|(v, t)| (v.to_string(), sample(*t)))
            .collect();
        ProtocolClient::from_params(
            "did:sidetree",
            &registry,
            &params,
            cas,
            store,
            DocumentType::DidDocument,
        )
        .unwrap()
    }

    #[test]
    fn get_returns_latest_at_or_before() {
        let c = client(&[("1.0", 100), ("1.1", 200)]);
        assert!(matches!(c.get(99), Err(ProtocolError::NoVersionAt { time: 99, .. })));
        assert_eq!(c.get(100).unwrap().version(), "1.0");
        assert_eq!(c.get(199).unwrap().version(), "1.0");
        assert_eq!(c.get(200).unwrap().version(), "1.1");
        assert_eq!(c.get(u64::MAX).unwrap().version(), "1.1");
        assert_eq!(c.current(150).unwrap().version(), "1.0");
    }

    #[test]
    fn get_by_genesis_is_exact() {
        let c = client(&[("1.0", 100), ("1.1", 200)]);
        assert_eq!(c.get_by_genesis(200).unwrap().version(), "1.1");
        assert!(matches!(
            c.get_by_genesis(150),
            Err(ProtocolError::UnknownGenesisTime(150))
        ));
    }

    #[test]
    fn rejects_shared_genesis_and_empty() {
        let mut builder = RegistryBuilder::new();
        builder.register("1.0", Arc::new(StubFactory)).unwrap();
        let registry = builder.build();
        let (cas, store) = stub_stores();
        let a = registry
            .create("1.0", sample(5), cas.clone(), store.clone(), DocumentType::FileIndex)
            .unwrap();
        let b = registry
            .create("1.0.1", sample(5), cas, store, DocumentType::FileIndex)
            .unwrap();

        assert!(ProtocolClient::new("file:idx", vec![a, b]).is_err());
        assert!(ProtocolClient::new("file:idx", vec![]).is_err());
    }

    #[test]
    fn provider_lookup() {
        let mut provider = ProtocolClientProvider::new();
        provider.insert(client(&[("1.0", 0)]));
        assert!(provider.for_namespace("did:sidetree").is_ok());
        assert!(matches!(
            provider.for_namespace("did:other"),
            Err(ProtocolError::NamespaceNotConfigured(_))
        ));
    }
}
