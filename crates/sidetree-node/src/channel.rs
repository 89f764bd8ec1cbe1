use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use sidetree_batch::{BatchContext, BatchError, BatchWriter, BatchWriterConfig};
use sidetree_ledger::{BlockPublisher, Ledger, OffLedgerStore};
use sidetree_observer::{
    metadata_key, Behavior, BlockProcessor, DocumentCache, DocumentCacheRegistry,
    InvalidatorBehavior, LeaseProvider, Membership, Notifier, Observer, ObserverBehavior,
    ObserverError, OffLedgerMetadataStore, ProcessorConfig, Role,
};
use sidetree_protocol::{load_protocol_file, ProtocolClient, ProtocolClientProvider, Registry};
use sidetree_queue::{OperationQueue, QueueProvider};
use sidetree_store::{Cas, OperationStoreProvider};
use sidetree_types::Operation;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{ChannelConfig, NodeConfig};
use crate::error::{NodeError, NodeResult};
use crate::loader::ResolverLoader;

/// Capacity of the notifier to observer event channel. Overflow is dropped;
/// the observer timer covers it.
const EVENT_BUFFER: usize = 16;

/// Ledger-side collaborators of one channel.
#[derive(Clone)]
pub struct ChannelDeps {
    pub ledger: Arc<dyn Ledger>,
    pub publisher: Arc<dyn BlockPublisher>,
    pub cas: Arc<dyn Cas>,
    pub off_ledger: Arc<dyn OffLedgerStore>,
    pub membership: Arc<dyn Membership>,
    pub op_stores: Arc<dyn OperationStoreProvider>,
}

struct Writer {
    writer: BatchWriter,
    queue: Arc<dyn OperationQueue>,
}

/// An observer together with the notifier feeding it.
struct Watch<B> {
    observer: Observer<B>,
    notifier: Notifier,
}

impl<B: Behavior + 'static> Watch<B> {
    fn new(config: &NodeConfig, channel: &str, processor: BlockProcessor<B>) -> Self {
        Self {
            observer: Observer::new(channel, config.observer.period(), Arc::new(processor)),
            notifier: Notifier::new(channel, &config.sidetree_chaincode),
        }
    }

    fn start(&self, publisher: Arc<dyn BlockPublisher>) -> NodeResult<()> {
        let (events, receiver) = mpsc::channel(EVENT_BUFFER);
        self.observer.start(receiver)?;
        self.notifier.start(publisher, events)?;
        Ok(())
    }

    async fn stop(&self) -> NodeResult<()> {
        let notifier = self.notifier.stop().await;
        let observer = self.observer.stop().await;
        Ok(notifier.and(observer)?)
    }

    async fn process_now(&self) -> NodeResult<()> {
        Ok(self.observer.processor().process_blockchain().await?)
    }
}

/// Everything one peer runs for one channel, chosen by its roles:
///
/// - `batch-writer`: a [`BatchWriter`] per namespace over a persistent queue
/// - `observer`, `observer-standby`, `resolver`: the lease-holding
///   [`Observer`] that fills the operation store
/// - `resolver`: a [`DocumentCache`] per namespace and an invalidator that
///   keeps it fresh
///
/// A controller runs once; a stopped one is discarded and rebuilt.
pub struct ChannelController {
    name: String,
    config: NodeConfig,
    deps: ChannelDeps,
    clients: Arc<ProtocolClientProvider>,
    writers: BTreeMap<String, Writer>,
    observer: Option<Watch<ObserverBehavior>>,
    caches: Option<Arc<DocumentCacheRegistry>>,
    invalidator: Mutex<Option<Arc<Watch<InvalidatorBehavior>>>>,
}

impl ChannelController {
    /// Wire every component for `channel`. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(
        config: &NodeConfig,
        channel: &ChannelConfig,
        registry: &Registry,
        queues: &dyn QueueProvider,
        caches: Arc<DocumentCacheRegistry>,
        deps: ChannelDeps,
    ) -> NodeResult<Self> {
        let name = channel.name.clone();

        let mut clients = ProtocolClientProvider::new();
        let mut op_stores = BTreeMap::new();
        for ns in &channel.namespaces {
            let params = load_protocol_file(&ns.protocol_file)?;
            let op_store = deps.op_stores.for_namespace(&ns.namespace)?;
            let client = ProtocolClient::from_params(
                &ns.namespace,
                registry,
                &params,
                Arc::clone(&deps.cas),
                Arc::clone(&op_store),
                ns.document_type,
            )?;
            clients.insert(client);
            op_stores.insert(ns.namespace.clone(), op_store);
        }
        let clients = Arc::new(clients);

        let mut writers = BTreeMap::new();
        if config.has_role(Role::BatchWriter) {
            for ns in &channel.namespaces {
                let queue = queues.create(&name, &ns.namespace)?;
                let ctx = BatchContext {
                    channel: name.clone(),
                    namespace: ns.namespace.clone(),
                    sidetree_chaincode: config.sidetree_chaincode.clone(),
                    queue: Arc::clone(&queue),
                    protocol_client: clients.for_namespace(&ns.namespace)?,
                    ledger: Arc::clone(&deps.ledger),
                };
                let writer_config = BatchWriterConfig {
                    batch_timeout: ns.batch_timeout(),
                    ..BatchWriterConfig::default()
                };
                let writer = BatchWriter::new(ctx, writer_config)?;
                writers.insert(ns.namespace.clone(), Writer { writer, queue });
            }
        }

        let observer = config.runs_observer().then(|| {
            let metadata = OffLedgerMetadataStore::new(
                &name,
                metadata_key(config.clustered, &config.peer_id, &config.msp_id),
                Arc::clone(&deps.off_ledger),
            );
            let leases = LeaseProvider::new(&name, Arc::clone(&deps.membership), config.clustered);
            let processor = BlockProcessor::new(
                processor_config(config, &name),
                Arc::clone(&deps.ledger),
                Arc::clone(&clients),
                ObserverBehavior::new(&name, Arc::new(metadata), leases),
            );
            Watch::new(config, &name, processor)
        });

        let caches = if config.has_role(Role::Resolver) {
            let mut built = Vec::new();
            for ns in &channel.namespaces {
                let client = clients.for_namespace(&ns.namespace)?;
                let op_store = op_stores
                    .get(&ns.namespace)
                    .cloned()
                    .ok_or_else(|| unknown_namespace(&name, &ns.namespace))?;
                let loader = ResolverLoader::new(&client, op_store)?;
                built.push(DocumentCache::new(
                    &name,
                    &ns.namespace,
                    ns.cache_size,
                    Arc::new(loader),
                ));
            }
            for cache in built {
                caches.register(&name, Arc::new(cache))?;
            }
            Some(caches)
        } else {
            None
        };

        info!(
            channel = %name,
            namespaces = channel.namespaces.len(),
            writers = writers.len(),
            observer = observer.is_some(),
            resolver = caches.is_some(),
            "channel wired"
        );
        Ok(Self {
            name,
            config: config.clone(),
            deps,
            clients,
            writers,
            observer,
            caches,
            invalidator: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.clients.namespaces()
    }

    pub fn protocol_clients(&self) -> &Arc<ProtocolClientProvider> {
        &self.clients
    }

    /// Start writers, observer and invalidator. The invalidator begins at the
    /// current tip, since cache entries only exist from now on.
    pub async fn start(&self) -> NodeResult<()> {
        for w in self.writers.values() {
            w.writer.start()?;
        }
        if let Some(observer) = &self.observer {
            observer.start(Arc::clone(&self.deps.publisher))?;
        }
        if let Some(caches) = &self.caches {
            let height = self.deps.ledger.height().await?;
            let processor = BlockProcessor::new(
                processor_config(&self.config, &self.name),
                Arc::clone(&self.deps.ledger),
                Arc::clone(&self.clients),
                InvalidatorBehavior::new(&self.name, Arc::clone(caches), height.saturating_sub(1)),
            );
            let watch = Arc::new(Watch::new(&self.config, &self.name, processor));
            watch.start(Arc::clone(&self.deps.publisher))?;
            *self.invalidator.lock() = Some(watch);
        }
        info!(channel = %self.name, "channel started");
        Ok(())
    }

    /// Stop every task and close the queues. Queued operations stay on
    /// disk for the next controller. Every component is stopped even if
    /// one fails; the first error is returned.
    pub async fn stop(&self) -> NodeResult<()> {
        let mut first = None;
        let mut note = |result: NodeResult<()>| {
            if let Err(e) = result {
                warn!(channel = %self.name, error = %e, "error stopping channel component");
                first.get_or_insert(e);
            }
        };

        for w in self.writers.values() {
            match w.writer.stop().await {
                Ok(()) | Err(BatchError::NotRunning) => {}
                Err(e) => note(Err(e.into())),
            }
            note(w.queue.close().map_err(NodeError::from));
        }
        if let Some(observer) = &self.observer {
            note(ignore_not_running(observer.stop().await));
        }
        let invalidator = self.invalidator.lock().take();
        if let Some(invalidator) = invalidator {
            note(ignore_not_running(invalidator.stop().await));
        }
        if let Some(caches) = &self.caches {
            caches.remove_channel(&self.name);
        }

        info!(channel = %self.name, "channel stopped");
        first.map_or(Ok(()), Err)
    }

    /// Validate `op` and queue it for anchoring under its namespace.
    /// Returns the queue length.
    pub async fn add_operation(&self, op: Operation) -> NodeResult<u64> {
        if !self.config.has_role(Role::BatchWriter) {
            return Err(NodeError::MissingRole(Role::BatchWriter.as_str()));
        }
        let writer = self
            .writers
            .get(op.namespace())
            .ok_or_else(|| unknown_namespace(&self.name, op.namespace()))?;
        Ok(writer.writer.add(op).await?)
    }

    /// Anchor due batches on every namespace now. With `force`, the batch
    /// timeout is ignored. Returns the operations anchored.
    pub async fn flush(&self, force: bool) -> NodeResult<usize> {
        let mut anchored = 0;
        for w in self.writers.values() {
            anchored += w.writer.flush(force).await?;
        }
        Ok(anchored)
    }

    /// Queued operations for `namespace`.
    pub fn queue_len(&self, namespace: &str) -> NodeResult<u64> {
        self.writers
            .get(namespace)
            .map(|w| w.queue.len())
            .ok_or_else(|| unknown_namespace(&self.name, namespace))
    }

    /// Run one observer round, then one invalidator round, without waiting
    /// for the timer.
    pub async fn process_now(&self) -> NodeResult<()> {
        if let Some(observer) = &self.observer {
            observer.process_now().await?;
        }
        let invalidator = self.invalidator.lock().clone();
        if let Some(invalidator) = invalidator {
            invalidator.process_now().await?;
        }
        Ok(())
    }

    /// The document for `unique_suffix`, through the namespace's cache.
    pub async fn resolve(&self, namespace: &str, unique_suffix: &str) -> NodeResult<Option<Value>> {
        let caches = self
            .caches
            .as_ref()
            .ok_or(NodeError::MissingRole(Role::Resolver.as_str()))?;
        let cache = match caches.get(&self.name, namespace) {
            Ok(cache) => cache,
            Err(ObserverError::CacheNotFound { .. }) => {
                return Err(unknown_namespace(&self.name, namespace))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(cache.resolve(unique_suffix).await?)
    }
}

fn processor_config(config: &NodeConfig, channel: &str) -> ProcessorConfig {
    ProcessorConfig {
        max_attempts: config.observer.max_attempts,
        ..ProcessorConfig::new(channel, &config.sidetree_chaincode)
    }
}

fn unknown_namespace(channel: &str, namespace: &str) -> NodeError {
    NodeError::UnknownNamespace {
        channel: channel.to_string(),
        namespace: namespace.to_string(),
    }
}

fn ignore_not_running(result: NodeResult<()>) -> NodeResult<()> {
    match result {
        Err(NodeError::Observer(ObserverError::NotRunning(_))) => Ok(()),
        other => other,
    }
}
