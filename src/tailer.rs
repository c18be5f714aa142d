//! Checkpointed tailer over one pair's signal log.
//!
//! The tailer owns the pair's read cursor. `poll` surfaces records past the
//! cursor and advances it in memory only; the checkpoint is persisted when
//! the consumer acknowledges a record, never before. On restart the cursor
//! resumes at the last persisted checkpoint, so confirmed records are never
//! re-surfaced and unconfirmed ones are never skipped.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::PipelineError;
use crate::models::{Pair, Signal};
use crate::store::{CheckpointStore, SignalLogStore};

pub struct LogTailer {
    store: Arc<SignalLogStore>,
    checkpoints: Arc<CheckpointStore>,
    pair: Pair,
    /// Highest sequence yielded to the consumer (in-memory only).
    cursor: u64,
    /// Highest sequence durably acknowledged.
    acknowledged: u64,
}

impl LogTailer {
    /// Resume from the pair's persisted checkpoint (0 = full replay).
    pub fn resume(
        store: Arc<SignalLogStore>,
        checkpoints: Arc<CheckpointStore>,
        pair: Pair,
    ) -> Self {
        let acknowledged = checkpoints.load(&pair);
        info!(pair = %pair, checkpoint = acknowledged, "tailer resuming");
        Self {
            store,
            checkpoints,
            pair,
            cursor: acknowledged,
            acknowledged,
        }
    }

    pub fn pair(&self) -> &Pair {
        &self.pair
    }

    /// Records past the cursor, oldest first. Empty when caught up; poll
    /// again later. Advances the in-memory cursor over everything returned.
    pub fn poll(&mut self) -> Result<Vec<Signal>, PipelineError> {
        let batch = self.store.read_from(&self.pair, self.cursor + 1)?;
        if let Some(last) = batch.last() {
            debug!(pair = %self.pair, from = self.cursor + 1, to = last.sequence, "tailer batch");
            self.cursor = last.sequence;
        }
        Ok(batch)
    }

    /// Durably record that everything up to `sequence` has been handled.
    /// Acknowledgements are strictly sequential per pair; a stale or
    /// out-of-order value is a logic error upstream.
    pub fn acknowledge(&mut self, sequence: u64) -> Result<(), PipelineError> {
        debug_assert!(sequence > self.acknowledged, "acknowledgements must advance");
        self.checkpoints.store(&self.pair, sequence)?;
        self.acknowledged = sequence;
        Ok(())
    }

    /// Last durably acknowledged sequence.
    pub fn acknowledged(&self) -> u64 {
        self.acknowledged
    }
}
