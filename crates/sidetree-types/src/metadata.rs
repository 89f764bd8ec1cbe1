use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Progress record persisted by the observer for each owner (peer or MSP).
///
/// `last_tx_num_processed` is `-1` exactly when `last_block_processed` was
/// fully processed; otherwise the next round resumes inside that block at
/// the recorded transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverMetadata {
    pub last_block_processed: u64,
    pub last_tx_num_processed: i64,
    pub lease_owner: String,
    pub failed_attempts: u32,
    pub last_error_code: Option<ErrorCode>,
}

impl ObserverMetadata {
    pub fn new(lease_owner: impl Into<String>, last_block_processed: u64) -> Self {
        Self {
            last_block_processed,
            last_tx_num_processed: -1,
            lease_owner: lease_owner.into(),
            failed_attempts: 0,
            last_error_code: None,
        }
    }

    /// Mark `block` as fully processed and clear any error state.
    pub fn complete_block(&mut self, block: u64) {
        self.last_block_processed = block;
        self.last_tx_num_processed = -1;
        self.last_error_code = None;
        self.failed_attempts = 0;
    }

    /// Forget the last error so the next write starts a fresh attempt count.
    pub fn clear_error(&mut self) {
        self.failed_attempts = 0;
        self.last_error_code = None;
    }

    /// The first block the next round should visit.
    pub fn resume_block(&self) -> u64 {
        if self.last_error_code.is_some() {
            self.last_block_processed
        } else {
            self.last_block_processed + 1
        }
    }
}
