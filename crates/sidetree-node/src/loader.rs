use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sidetree_observer::{DocumentLoader, ObserverError, ObserverResult};
use sidetree_protocol::{ProtocolClient, ProtocolError};
use sidetree_store::OperationStore;
use sidetree_v1::{DocumentResolver, OperationParser};

use crate::error::NodeResult;

/// Loads documents by folding the operation store under the newest
/// protocol version of a namespace.
pub struct ResolverLoader {
    resolver: DocumentResolver,
}

impl ResolverLoader {
    pub fn new(client: &ProtocolClient, op_store: Arc<dyn OperationStore>) -> NodeResult<Self> {
        let latest = client
            .versions()
            .last()
            .ok_or_else(|| ProtocolError::NamespaceNotConfigured(client.namespace().to_string()))?;
        let parser = OperationParser::new(latest.protocol().clone())?;
        Ok(Self {
            resolver: DocumentResolver::new(parser, op_store),
        })
    }
}

#[async_trait]
impl DocumentLoader for ResolverLoader {
    async fn load(&self, unique_suffix: &str) -> ObserverResult<Option<Value>> {
        let Some(state) = self.resolver.resolve(unique_suffix).await? else {
            return Ok(None);
        };
        serde_json::to_value(state)
            .map(Some)
            .map_err(|e| ObserverError::Loader(e.to_string()))
    }
}
