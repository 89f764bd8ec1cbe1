use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::QueueResult;
use crate::memory::MemoryOperationQueue;
use crate::sqlite::SqliteOperationQueue;
use crate::traits::OperationQueue;

/// Opens the operation queue for a (channel, namespace).
pub trait QueueProvider: Send + Sync {
    fn create(&self, channel: &str, namespace: &str) -> QueueResult<Arc<dyn OperationQueue>>;
}

/// Opens SQLite queues under `<base_dir>/<channel>/<namespace>/`.
#[derive(Clone, Debug)]
pub struct SqliteQueueProvider {
    base_dir: PathBuf,
}

impl SqliteQueueProvider {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory holding the queue for (channel, namespace).
    pub fn queue_dir(&self, channel: &str, namespace: &str) -> PathBuf {
        self.base_dir.join(channel).join(namespace)
    }
}

impl QueueProvider for SqliteQueueProvider {
    fn create(&self, channel: &str, namespace: &str) -> QueueResult<Arc<dyn OperationQueue>> {
        let queue = SqliteOperationQueue::open(self.queue_dir(channel, namespace))?;
        Ok(Arc::new(queue))
    }
}

/// Creates a fresh in-memory queue on every call.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryQueueProvider;

impl QueueProvider for MemoryQueueProvider {
    fn create(&self, _channel: &str, _namespace: &str) -> QueueResult<Arc<dyn OperationQueue>> {
        Ok(Arc::new(MemoryOperationQueue::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidetree_types::{Operation, OperationType};

    #[test]
    fn sqlite_provider_lays_out_per_channel_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SqliteQueueProvider::new(dir.path());

        let q = provider.create("mychannel", "did:sidetree").unwrap();
        let op = Operation::new("abc", OperationType::Create, "did:sidetree", vec![]).unwrap();
        q.add(&op, 0).unwrap();

        assert!(dir
            .path()
            .join("mychannel")
            .join("did:sidetree")
            .join(crate::sqlite::QUEUE_DB_FILE)
            .exists());

        let other = provider.create("mychannel", "file:idx").unwrap();
        assert!(other.is_empty());
    }
}
