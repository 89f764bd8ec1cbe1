use std::sync::Arc;

use parking_lot::Mutex;
use sidetree_ledger::{Block, BlockPublisher, TxEvent};
use sidetree_types::ANCHOR_PREFIX;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ObserverError, ObserverResult};

/// One event per transaction in `block` carrying an anchor write under
/// `sidetree_chaincode`.
pub fn anchor_events(block: &Block, sidetree_chaincode: &str) -> Vec<TxEvent> {
    block
        .transactions
        .iter()
        .filter(|tx| {
            tx.writes.iter().any(|w| {
                w.namespace == sidetree_chaincode
                    && w.collection.is_none()
                    && !w.is_delete
                    && w.key.starts_with(ANCHOR_PREFIX)
            })
        })
        .map(|tx| TxEvent {
            block_num: block.number,
            tx_num: tx.tx_num,
            channel: block.channel.clone(),
            tx_id: tx.tx_id.clone(),
        })
        .collect()
}

/// Turns committed blocks into [`TxEvent`]s for the observer.
///
/// Events are sent with `try_send`: a full channel means a round is
/// already pending, so the event is dropped rather than blocking the feed.
pub struct Notifier {
    channel: String,
    sidetree_chaincode: String,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Notifier {
    pub fn new(channel: impl Into<String>, sidetree_chaincode: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            sidetree_chaincode: sidetree_chaincode.into(),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn start(
        &self,
        publisher: Arc<dyn BlockPublisher>,
        events: mpsc::Sender<TxEvent>,
    ) -> ObserverResult<()> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Err(ObserverError::AlreadyStarted("notifier"));
        }
        let feed = publisher.subscribe();
        let channel = self.channel.clone();
        let chaincode = self.sidetree_chaincode.clone();
        let cancel = self.cancel.clone();
        *task = Some(tokio::spawn(async move {
            forward(feed, events, &channel, &chaincode, cancel).await;
        }));
        info!(channel = %self.channel, "notifier started");
        Ok(())
    }

    pub async fn stop(&self) -> ObserverResult<()> {
        let task = self.task.lock().take().ok_or(ObserverError::NotRunning("notifier"))?;
        self.cancel.cancel();
        if let Err(e) = task.await {
            warn!(channel = %self.channel, error = %e, "notifier task ended abnormally");
        }
        info!(channel = %self.channel, "notifier stopped");
        Ok(())
    }
}

async fn forward(
    mut feed: broadcast::Receiver<Arc<Block>>,
    events: mpsc::Sender<TxEvent>,
    channel: &str,
    chaincode: &str,
    cancel: CancellationToken,
) {
    loop {
        let block = tokio::select! {
            _ = cancel.cancelled() => return,
            received = feed.recv() => match received {
                Ok(block) => block,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The observer's timer picks up whatever was missed.
                    warn!(channel, skipped, "notifier lagged behind block feed");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(channel, "block feed closed");
                    return;
                }
            },
        };

        for event in anchor_events(&block, chaincode) {
            match events.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(event)) => {
                    debug!(
                        channel,
                        block = event.block_num,
                        tx = event.tx_num,
                        "observer busy, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(channel, "observer gone, notifier exiting");
                    return;
                }
            }
        }
    }
}
