use std::sync::Arc;
use std::time::Duration;

use sidetree_protocol::{ProtocolClient, Version};
use sidetree_queue::OperationQueue;
use sidetree_types::QueuedOperation;
use tracing::debug;

use crate::error::BatchResult;

/// Why a batch was cut.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CutReason {
    /// The head version's `max_operation_count` was reached.
    Full,
    /// Operations under a later protocol version wait behind this batch.
    VersionBoundary,
    /// The head operation has waited longer than the batch timeout.
    Timeout,
    Forced,
}

/// A batch ready to be written. Nothing is removed from the queue until
/// the writer acknowledges the anchor.
#[derive(Debug)]
pub struct Cut {
    pub operations: Vec<QueuedOperation>,
    pub version: Arc<Version>,
    pub reason: CutReason,
}

impl Cut {
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn protocol_genesis_time(&self) -> u64 {
        self.version.genesis_time()
    }
}

/// Decides when and how much of the queue head forms a batch.
pub struct Cutter {
    queue: Arc<dyn OperationQueue>,
    client: Arc<ProtocolClient>,
    batch_timeout: Duration,
}

impl Cutter {
    pub fn new(
        queue: Arc<dyn OperationQueue>,
        client: Arc<ProtocolClient>,
        batch_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            client,
            batch_timeout,
        }
    }

    /// Cut a batch from the queue head if one is due at `now_ms`.
    ///
    /// A batch never spans two protocol genesis times. With `force`, any
    /// non-empty head is cut.
    pub fn cut(&self, force: bool, now_ms: i64) -> BatchResult<Option<Cut>> {
        let Some(head) = self.queue.peek(1)?.into_iter().next() else {
            return Ok(None);
        };
        let genesis = head.protocol_genesis_time;
        let version = self.client.get_by_genesis(genesis)?;
        let max = version.protocol().max_operation_count;

        // One extra so a waiting boundary is visible.
        let mut operations = self.queue.peek(max.saturating_add(1))?;
        let same_version = operations
            .iter()
            .take_while(|q| q.protocol_genesis_time == genesis)
            .count();
        let boundary = same_version < operations.len();
        operations.truncate(same_version.min(max));

        let waited = now_ms.saturating_sub(head.operation.arrived_at());
        let timed_out = waited >= 0 && waited as u128 >= self.batch_timeout.as_millis();

        let reason = if operations.len() >= max {
            CutReason::Full
        } else if boundary {
            CutReason::VersionBoundary
        } else if timed_out {
            CutReason::Timeout
        } else if force {
            CutReason::Forced
        } else {
            debug!(
                pending = operations.len(),
                waited_ms = waited,
                "batch not due"
            );
            return Ok(None);
        };

        debug!(
            count = operations.len(),
            genesis_time = genesis,
            reason = ?reason,
            "cut batch"
        );
        Ok(Some(Cut {
            operations,
            version,
            reason,
        }))
    }
}
