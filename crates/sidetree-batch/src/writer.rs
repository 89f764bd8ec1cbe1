use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use sidetree_ledger::Ledger;
use sidetree_protocol::ProtocolClient;
use sidetree_queue::OperationQueue;
use sidetree_types::{AnchorRecord, AnchorString, Classify, Operation};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cutter::{Cut, Cutter};
use crate::error::{BatchError, BatchResult};

/// Tuning for the writer loop.
#[derive(Clone, Debug)]
pub struct BatchWriterConfig {
    /// Longest time an operation waits at the head before a batch is cut.
    pub batch_timeout: Duration,
    /// How often the queue is checked without an `add` notification.
    pub poll_interval: Duration,
    pub retry_initial: Duration,
    pub retry_max: Duration,
}

impl Default for BatchWriterConfig {
    fn default() -> Self {
        Self {
            batch_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(500),
            retry_initial: Duration::from_millis(200),
            retry_max: Duration::from_secs(30),
        }
    }
}

impl BatchWriterConfig {
    pub fn validate(&self) -> BatchResult<()> {
        if self.poll_interval.is_zero() {
            return Err(BatchError::InvalidConfig("poll interval must be non-zero".into()));
        }
        if self.retry_initial.is_zero() || self.retry_initial > self.retry_max {
            return Err(BatchError::InvalidConfig(format!(
                "retry bounds {:?}..{:?} are invalid",
                self.retry_initial, self.retry_max
            )));
        }
        Ok(())
    }
}

/// Collaborators of one namespace's writer.
#[derive(Clone)]
pub struct BatchContext {
    pub channel: String,
    pub namespace: String,
    /// Chaincode namespace anchor records are written under.
    pub sidetree_chaincode: String,
    pub queue: Arc<dyn OperationQueue>,
    pub protocol_client: Arc<ProtocolClient>,
    pub ledger: Arc<dyn Ledger>,
}

/// Exponential backoff with jitter, capped at `max`.
#[derive(Debug)]
pub(crate) struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(self.max);
        let jitter_ms = base.as_millis() as u64 / 4;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        (base + Duration::from_millis(jitter)).min(self.max)
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.initial;
    }
}

struct Inner {
    ctx: BatchContext,
    cutter: Cutter,
    config: BatchWriterConfig,
    wakeup: Notify,
    /// Held from cut to dequeue so concurrent writes never share a head.
    writing: AsyncMutex<()>,
}

/// Accepts operations into the queue and anchors them in batches.
///
/// Operations leave the queue only after the ledger acknowledges the
/// anchor that carries them.
pub struct BatchWriter {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BatchWriter {
    pub fn new(ctx: BatchContext, config: BatchWriterConfig) -> BatchResult<Self> {
        config.validate()?;
        let cutter = Cutter::new(
            Arc::clone(&ctx.queue),
            Arc::clone(&ctx.protocol_client),
            config.batch_timeout,
        );
        Ok(Self {
            inner: Arc::new(Inner {
                ctx,
                cutter,
                config,
                wakeup: Notify::new(),
                writing: AsyncMutex::new(()),
            }),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.inner.ctx.namespace
    }

    /// Validate `op` under the current protocol version and enqueue it.
    /// Returns the new queue length.
    pub async fn add(&self, op: Operation) -> BatchResult<u64> {
        let ctx = &self.inner.ctx;
        let height = ctx.ledger.height().await?;
        let version = ctx.protocol_client.current(height)?;
        version.operation_validator().validate(&op)?;

        let len = ctx.queue.add(&op, version.genesis_time())?;
        debug!(
            namespace = %ctx.namespace,
            suffix = op.unique_suffix(),
            op_type = op.op_type().as_str(),
            genesis_time = version.genesis_time(),
            queued = len,
            "accepted operation"
        );
        self.inner.wakeup.notify_one();
        Ok(len)
    }

    /// Spawn the writer loop.
    pub fn start(&self) -> BatchResult<()> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Err(BatchError::AlreadyStarted);
        }
        let inner = Arc::clone(&self.inner);
        let cancel = self.cancel.clone();
        *task = Some(tokio::spawn(async move { inner.run(cancel).await }));
        info!(
            channel = %self.inner.ctx.channel,
            namespace = %self.inner.ctx.namespace,
            "batch writer started"
        );
        Ok(())
    }

    /// Stop the loop and wait for it to exit. Queued operations stay queued.
    pub async fn stop(&self) -> BatchResult<()> {
        let task = self.task.lock().take().ok_or(BatchError::NotRunning)?;
        self.cancel.cancel();
        if let Err(e) = task.await {
            warn!(
                namespace = %self.inner.ctx.namespace,
                error = %e,
                "batch writer task ended abnormally"
            );
        }
        info!(namespace = %self.inner.ctx.namespace, "batch writer stopped");
        Ok(())
    }

    /// Whether the loop has exited on its own after a fatal error.
    pub fn is_finished(&self) -> bool {
        self.task.lock().as_ref().is_some_and(JoinHandle::is_finished)
    }

    /// Write every due batch now, without retries. With `force`, batches
    /// are cut regardless of the timeout. Returns the operations anchored.
    pub async fn flush(&self, force: bool) -> BatchResult<usize> {
        let mut anchored = 0;
        while let Some(n) = self.inner.write_next(force).await? {
            anchored += n;
        }
        Ok(anchored)
    }
}

impl Inner {
    async fn run(&self, cancel: CancellationToken) {
        let mut backoff = Backoff::new(self.config.retry_initial, self.config.retry_max);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = self.wakeup.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            loop {
                match self.write_next(false).await {
                    Ok(Some(_)) => backoff.reset(),
                    Ok(None) => {
                        backoff.reset();
                        break;
                    }
                    Err(e) if e.is_transient() => {
                        let delay = backoff.next_delay();
                        warn!(
                            namespace = %self.ctx.namespace,
                            error = %e,
                            retry_in_ms = delay.as_millis() as u64,
                            "batch write failed, retrying"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    Err(e) => {
                        error!(
                            channel = %self.ctx.channel,
                            namespace = %self.ctx.namespace,
                            error = %e,
                            "batch writer stopping on fatal error"
                        );
                        return;
                    }
                }
            }
        }
    }

    /// Cut, encode, anchor and dequeue one batch.
    ///
    /// `Ok(None)` when nothing is due. A batch the encoder rejects as a
    /// whole is dropped so it cannot block the queue.
    async fn write_next(&self, force: bool) -> BatchResult<Option<usize>> {
        let _writing = self.writing.lock().await;
        let now = chrono::Utc::now().timestamp_millis();
        let Some(cut) = self.cutter.cut(force, now)? else {
            return Ok(None);
        };

        match self.anchor(&cut).await {
            Ok(anchor) => {
                let (removed, remaining) = self.ctx.queue.remove(cut.len())?;
                info!(
                    namespace = %self.ctx.namespace,
                    anchor = %anchor,
                    operations = removed,
                    remaining,
                    "anchored batch"
                );
                Ok(Some(removed))
            }
            Err(e) if e.is_batch_rejection() => {
                let (removed, remaining) = self.ctx.queue.remove(cut.len())?;
                error!(
                    namespace = %self.ctx.namespace,
                    error = %e,
                    dropped = removed,
                    remaining,
                    "dropping rejected batch"
                );
                Ok(Some(0))
            }
            Err(e) => Err(e),
        }
    }

    async fn anchor(&self, cut: &Cut) -> BatchResult<AnchorString> {
        let anchor = cut.version.batch_encoder().write_batch(&cut.operations).await?;
        let record =
            AnchorRecord::new(&anchor, &self.ctx.namespace, cut.protocol_genesis_time());
        let ack = self
            .ctx
            .ledger
            .submit(
                &self.ctx.sidetree_chaincode,
                "",
                &anchor.ledger_key(),
                record.to_json()?,
            )
            .await?;
        debug!(
            namespace = %self.ctx.namespace,
            tx_id = %ack.tx_id,
            block = ack.block_num,
            tx = ack.tx_num,
            "anchor committed"
        );
        Ok(anchor)
    }
}
