use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sidetree_ledger::TxEvent;
use sidetree_protocol::Version;
use sidetree_types::{ObserverMetadata, SidetreeTxn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ObserverError, ObserverResult};
use crate::lease::LeaseProvider;
use crate::metadata::MetadataStore;
use crate::processor::{Behavior, BlockProcessor};

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(10);

/// Applies anchored operations to the operation store, under a lease.
pub struct ObserverBehavior {
    channel: String,
    metadata: Arc<dyn MetadataStore>,
    leases: LeaseProvider,
}

impl ObserverBehavior {
    pub fn new(
        channel: impl Into<String>,
        metadata: Arc<dyn MetadataStore>,
        leases: LeaseProvider,
    ) -> Self {
        Self {
            channel: channel.into(),
            metadata,
            leases,
        }
    }

    /// Whether this peer should process now. A peer taking over an expired
    /// lease records itself as owner and waits for the next round.
    async fn check_lease_owner(&self, metadata: &mut ObserverMetadata) -> ObserverResult<bool> {
        let next = metadata.last_block_processed + 1;
        let current = self.leases.get_lease(&metadata.lease_owner);
        if self.leases.is_valid(&current) {
            if !current.is_local_peer_owner() {
                debug!(
                    channel = %self.channel,
                    block = next,
                    owner = current.owner(),
                    "lease held by another peer"
                );
                return Ok(false);
            }
            return Ok(true);
        }

        let lease = self.leases.create_lease(next);
        if !lease.is_local_peer_owner() {
            debug!(
                channel = %self.channel,
                block = next,
                owner = lease.owner(),
                "another peer is the new lease owner"
            );
            return Ok(false);
        }

        info!(
            channel = %self.channel,
            block = next,
            previous = current.owner(),
            "taking over lease"
        );
        metadata.lease_owner = lease.owner().to_string();
        self.metadata.put(metadata).await?;
        Ok(false)
    }
}

#[async_trait]
impl Behavior for ObserverBehavior {
    fn kind(&self) -> &'static str {
        "observer"
    }

    async fn begin_round(&self) -> ObserverResult<Option<ObserverMetadata>> {
        let mut metadata = match self.metadata.get().await? {
            Some(metadata) => metadata,
            None => ObserverMetadata::new(self.leases.create_lease(1).owner(), 0),
        };
        Ok(self.check_lease_owner(&mut metadata).await?.then_some(metadata))
    }

    async fn save_metadata(&self, metadata: &ObserverMetadata) -> ObserverResult<()> {
        self.metadata.put(metadata).await
    }

    fn next_lease_owner(&self, block: u64) -> Option<String> {
        Some(self.leases.create_lease(block).owner().to_string())
    }

    async fn process_txn(&self, txn: &SidetreeTxn, version: &Version) -> ObserverResult<()> {
        version.transaction_processor().process(txn).await?;
        Ok(())
    }
}

struct Running {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Drives a [`BlockProcessor`] from a timer and from ledger events.
///
/// A listener task turns ticks and events into triggers on a single-slot
/// channel; a processor task runs one round per trigger. Triggers arriving
/// while a round runs are dropped, so any number of events costs at most
/// one extra round.
pub struct Observer<B> {
    channel: String,
    period: Duration,
    processor: Arc<BlockProcessor<B>>,
    running: Mutex<Option<Running>>,
}

impl<B: Behavior + 'static> Observer<B> {
    /// A zero `period` selects [`DEFAULT_PERIOD`].
    pub fn new(
        channel: impl Into<String>,
        period: Duration,
        processor: Arc<BlockProcessor<B>>,
    ) -> Self {
        Self {
            channel: channel.into(),
            period: if period.is_zero() { DEFAULT_PERIOD } else { period },
            processor,
            running: Mutex::new(None),
        }
    }

    pub fn processor(&self) -> &Arc<BlockProcessor<B>> {
        &self.processor
    }

    pub fn start(&self, events: mpsc::Receiver<TxEvent>) -> ObserverResult<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(ObserverError::AlreadyStarted("observer"));
        }
        let cancel = CancellationToken::new();
        let (trigger, triggers) = mpsc::channel(1);

        let listener = tokio::spawn(listen(
            self.channel.clone(),
            self.period,
            Arc::clone(&self.processor),
            events,
            trigger,
            cancel.clone(),
        ));
        let worker = tokio::spawn(run(
            self.channel.clone(),
            Arc::clone(&self.processor),
            triggers,
            cancel.clone(),
        ));
        *running = Some(Running {
            cancel,
            tasks: vec![listener, worker],
        });
        info!(
            channel = %self.channel,
            kind = self.processor.behavior().kind(),
            period_ms = self.period.as_millis() as u64,
            "observer started"
        );
        Ok(())
    }

    /// Stop both tasks. A round in progress finishes its current block.
    pub async fn stop(&self) -> ObserverResult<()> {
        let running = self.running.lock().take().ok_or(ObserverError::NotRunning("observer"))?;
        running.cancel.cancel();
        for task in running.tasks {
            if let Err(e) = task.await {
                warn!(channel = %self.channel, error = %e, "observer task ended abnormally");
            }
        }
        info!(channel = %self.channel, kind = self.processor.behavior().kind(), "observer stopped");
        Ok(())
    }
}

async fn listen<B: Behavior>(
    channel: String,
    period: Duration,
    processor: Arc<BlockProcessor<B>>,
    mut events: mpsc::Receiver<TxEvent>,
    trigger: mpsc::Sender<()>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut events_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                debug!(channel = %channel, "scheduled round");
            }
            event = events.recv(), if events_open => match event {
                Some(event) => {
                    debug!(
                        channel = %channel,
                        block = event.block_num,
                        tx = event.tx_num,
                        "anchor event"
                    );
                }
                None => {
                    events_open = false;
                    continue;
                }
            },
        }

        if processor.is_running() {
            debug!(channel = %channel, "round already running, not triggering");
            continue;
        }
        if trigger.try_send(()).is_err() {
            debug!(channel = %channel, "round already pending");
        }
    }
}

async fn run<B: Behavior>(
    channel: String,
    processor: Arc<BlockProcessor<B>>,
    mut triggers: mpsc::Receiver<()>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            trigger = triggers.recv() => {
                if trigger.is_none() {
                    return;
                }
            }
        }
        if let Err(e) = processor.process_blockchain().await {
            warn!(
                channel = %channel,
                kind = processor.behavior().kind(),
                error = %e,
                "round failed"
            );
        }
    }
}
