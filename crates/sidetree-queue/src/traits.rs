use sidetree_types::{Operation, QueuedOperation};

use crate::error::QueueResult;

/// Durable FIFO of operations awaiting a batch.
///
/// Implementations must satisfy:
/// - `add` persists before returning; a failed add leaves the queue as it was.
/// - `peek` never removes; `remove` only ever removes from the head.
/// - After `close`, every call fails with [`QueueError::Closed`](crate::QueueError::Closed)
///   except `len`, which returns 0.
pub trait OperationQueue: Send + Sync {
    /// Append an operation accepted under `protocol_genesis_time`.
    /// Returns the new queue length.
    fn add(&self, op: &Operation, protocol_genesis_time: u64) -> QueueResult<u64>;

    /// Up to `n` operations from the head, oldest first.
    fn peek(&self, n: usize) -> QueueResult<Vec<QueuedOperation>>;

    /// Remove up to `n` operations from the head.
    /// Returns `(removed, new_len)`.
    fn remove(&self, n: usize) -> QueueResult<(usize, u64)>;

    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the backing storage.
    fn close(&self) -> QueueResult<()>;

    /// Delete the backing storage. The queue must be closed first.
    fn destroy(&self) -> QueueResult<()>;
}
