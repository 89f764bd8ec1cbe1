//! Persistent operation queue.
//!
//! Operations accepted by the batch writer wait here until their batch is
//! anchored. The queue is a durable FIFO keyed by a monotonically increasing
//! 64-bit slot number stored big-endian, so byte order equals numeric order
//! and `peek`/`remove` are range scans over `[head, to)`.
//!
//! - [`SqliteOperationQueue`] -- one SQLite database per (channel, namespace),
//!   opened in exclusive locking mode so a second process cannot open it
//! - [`MemoryOperationQueue`] -- same contract, no persistence
//!
//! Queues are opened through a [`QueueProvider`].

pub mod error;
pub mod memory;
pub mod provider;
pub mod sqlite;
pub mod traits;

pub use error::{QueueError, QueueResult};
pub use memory::MemoryOperationQueue;
pub use provider::{MemoryQueueProvider, QueueProvider, SqliteQueueProvider};
pub use sqlite::SqliteOperationQueue;
pub use traits::OperationQueue;
