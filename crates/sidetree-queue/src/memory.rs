use std::collections::VecDeque;

use parking_lot::RwLock;
use sidetree_types::{Operation, QueuedOperation};
use tracing::warn;

use crate::error::{QueueError, QueueResult};
use crate::traits::OperationQueue;

#[derive(Default)]
struct State {
    items: VecDeque<QueuedOperation>,
    closed: bool,
}

/// Non-persistent operation queue for tests and embedding.
#[derive(Default)]
pub struct MemoryOperationQueue {
    state: RwLock<State>,
}

impl MemoryOperationQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OperationQueue for MemoryOperationQueue {
    fn add(&self, op: &Operation, protocol_genesis_time: u64) -> QueueResult<u64> {
        let mut state = self.state.write();
        if state.closed {
            return Err(QueueError::Closed);
        }
        state
            .items
            .push_back(QueuedOperation::new(op.clone(), protocol_genesis_time));
        Ok(state.items.len() as u64)
    }

    fn peek(&self, n: usize) -> QueueResult<Vec<QueuedOperation>> {
        let state = self.state.write();
        if state.closed {
            return Err(QueueError::Closed);
        }
        Ok(state.items.iter().take(n).cloned().collect())
    }

    fn remove(&self, n: usize) -> QueueResult<(usize, u64)> {
        let mut state = self.state.write();
        if state.closed {
            return Err(QueueError::Closed);
        }
        let removed = n.min(state.items.len());
        state.items.drain(..removed);
        Ok((removed, state.items.len() as u64))
    }

    fn len(&self) -> u64 {
        let state = self.state.read();
        if state.closed {
            warn!("length requested on closed queue");
            return 0;
        }
        state.items.len() as u64
    }

    fn close(&self) -> QueueResult<()> {
        let mut state = self.state.write();
        if state.closed {
            return Err(QueueError::Closed);
        }
        state.closed = true;
        Ok(())
    }

    fn destroy(&self) -> QueueResult<()> {
        let mut state = self.state.write();
        if !state.closed {
            return Err(QueueError::NotClosed);
        }
        state.items.clear();
        Ok(())
    }
}
