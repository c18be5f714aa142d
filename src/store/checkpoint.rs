//! Per-pair delivery cursors, persisted atomically.
//!
//! A checkpoint records the last acknowledged sequence number for a pair.
//! Writes go to a temp file first and are renamed into place, so a crash
//! mid-write can never leave a torn value. A missing or malformed checkpoint
//! falls back to 0 (full replay): the dispatcher's dedup cache and the
//! gateway's idempotency key make replay safe, losing records would not be.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PipelineError;
use crate::models::Pair;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    last_acknowledged: u64,
}

/// Durable store of per-pair checkpoints.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, pair: &Pair) -> PathBuf {
        self.dir.join(format!("{}.ckpt", pair.file_stem()))
    }

    /// Last acknowledged sequence for this pair. 0 when no checkpoint exists
    /// or the persisted value cannot be read (conservative: full replay).
    pub fn load(&self, pair: &Pair) -> u64 {
        let path = self.path(pair);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(pair = %pair, error = %e, "unreadable checkpoint; replaying from start");
                return 0;
            }
        };
        match serde_json::from_str::<CheckpointFile>(&content) {
            Ok(ckpt) => ckpt.last_acknowledged,
            Err(e) => {
                warn!(pair = %pair, error = %e, "malformed checkpoint; replaying from start");
                0
            }
        }
    }

    /// Persist a new checkpoint value. Write-new-then-rename.
    pub fn store(&self, pair: &Pair, last_acknowledged: u64) -> Result<(), PipelineError> {
        let io_err = |source| PipelineError::Durability {
            pair: pair.clone(),
            source,
        };

        let body = serde_json::to_string(&CheckpointFile { last_acknowledged }).map_err(|e| {
            PipelineError::Corrupt {
                pair: pair.clone(),
                detail: format!("serialize checkpoint: {e}"),
            }
        })?;

        let tmp = self.dir.join(format!("{}.ckpt.tmp", pair.file_stem()));
        let mut file = File::create(&tmp).map_err(io_err)?;
        file.write_all(body.as_bytes()).map_err(io_err)?;
        file.sync_data().map_err(io_err)?;
        drop(file);

        fs::rename(&tmp, self.path(pair)).map_err(io_err)?;
        Ok(())
    }
}
