use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sidetree_observer::{DocumentCacheRegistry, Member};
use sidetree_protocol::{ProtocolResult, Registry, RegistryBuilder};
use sidetree_queue::{QueueProvider, SqliteQueueProvider};
use tracing::{info, warn};

use crate::channel::{ChannelController, ChannelDeps};
use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};

/// Registry with every protocol version this build supports.
pub fn default_registry() -> ProtocolResult<Registry> {
    let mut builder = RegistryBuilder::new();
    builder.register(sidetree_v1::VERSION, Arc::new(sidetree_v1::Factory))?;
    Ok(builder.build())
}

/// A peer's Sidetree services across the channels it has joined.
///
/// The registry is frozen at construction; channels come and go as the
/// peer joins and leaves them.
pub struct SidetreeNode {
    config: NodeConfig,
    registry: Registry,
    queues: Arc<dyn QueueProvider>,
    caches: Arc<DocumentCacheRegistry>,
    channels: RwLock<HashMap<String, Arc<ChannelController>>>,
}

impl SidetreeNode {
    pub fn new(
        config: NodeConfig,
        registry: Registry,
        queues: Arc<dyn QueueProvider>,
    ) -> NodeResult<Self> {
        config.validate()?;
        info!(
            peer = %config.peer_id,
            msp = %config.msp_id,
            clustered = config.clustered,
            roles = ?config.roles,
            versions = ?registry.versions(),
            "sidetree node created"
        );
        Ok(Self {
            config,
            registry,
            queues,
            caches: Arc::new(DocumentCacheRegistry::new()),
            channels: RwLock::new(HashMap::new()),
        })
    }

    /// Node with the default registry and on-disk queues under
    /// `config.queue_dir`.
    pub fn from_config(config: NodeConfig) -> NodeResult<Self> {
        let queues = Arc::new(SqliteQueueProvider::new(&config.queue_dir));
        Self::new(config, default_registry()?, queues)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// This peer as seen by the membership layer.
    pub fn member(&self) -> Member {
        Member::new(&self.config.peer_id, &self.config.msp_id, self.config.roles.iter().copied())
    }

    /// Wire and start the configured channel `name`.
    pub async fn join_channel(
        &self,
        name: &str,
        deps: ChannelDeps,
    ) -> NodeResult<Arc<ChannelController>> {
        let channel = self
            .config
            .channel(name)
            .ok_or_else(|| NodeError::UnknownChannel(name.to_string()))?;
        if self.channels.read().contains_key(name) {
            return Err(NodeError::ChannelRunning(name.to_string()));
        }

        let controller = Arc::new(ChannelController::new(
            &self.config,
            channel,
            &self.registry,
            self.queues.as_ref(),
            Arc::clone(&self.caches),
            deps,
        )?);
        if let Err(e) = controller.start().await {
            if let Err(stop) = controller.stop().await {
                warn!(channel = name, error = %stop, "cleanup after failed start");
            }
            return Err(e);
        }

        let mut channels = self.channels.write();
        if channels.contains_key(name) {
            drop(channels);
            if let Err(e) = controller.stop().await {
                warn!(channel = name, error = %e, "stopping duplicate controller");
            }
            return Err(NodeError::ChannelRunning(name.to_string()));
        }
        channels.insert(name.to_string(), Arc::clone(&controller));
        info!(channel = name, "joined channel");
        Ok(controller)
    }

    pub fn channel(&self, name: &str) -> NodeResult<Arc<ChannelController>> {
        self.channels
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| NodeError::UnknownChannel(name.to_string()))
    }

    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<_> = self.channels.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop and forget channel `name`.
    pub async fn leave_channel(&self, name: &str) -> NodeResult<()> {
        let controller = self
            .channels
            .write()
            .remove(name)
            .ok_or_else(|| NodeError::UnknownChannel(name.to_string()))?;
        controller.stop().await?;
        info!(channel = name, "left channel");
        Ok(())
    }

    /// Leave every channel. All channels are stopped even if one fails.
    pub async fn stop(&self) -> NodeResult<()> {
        let controllers: Vec<_> = self.channels.write().drain().collect();
        let mut first = None;
        for (name, controller) in controllers {
            if let Err(e) = controller.stop().await {
                warn!(channel = %name, error = %e, "error stopping channel");
                first.get_or_insert(e);
            }
        }
        info!(peer = %self.config.peer_id, "sidetree node stopped");
        first.map_or(Ok(()), Err)
    }
}
