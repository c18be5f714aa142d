//! Append-only per-pair signal logs: the system's single source of truth.
//!
//! One JSONL file per (strategy, timeframe) pair. Each line is an independent
//! JSON object, which keeps the format resilient to partial writes: a crash
//! mid-append leaves at most one malformed trailing line, which readers skip
//! and the writer truncates on the next startup.
//!
//! Sequence numbers are assigned under a per-pair mutex, so appends to one
//! pair are serialized (single-writer discipline) while different pairs
//! proceed in parallel.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::models::{Pair, Signal, SignalData};

/// Durable append-only store, one log per pair.
pub struct SignalLogStore {
    dir: PathBuf,
    writers: Mutex<HashMap<Pair, Arc<Mutex<PairWriter>>>>,
}

struct PairWriter {
    file: File,
    next_sequence: u64,
}

impl SignalLogStore {
    /// Open (creating the directory if needed). Writers are initialized
    /// lazily per pair on first append.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            writers: Mutex::new(HashMap::new()),
        })
    }

    fn log_path(&self, pair: &Pair) -> PathBuf {
        self.dir.join(format!("{}.jsonl", pair.file_stem()))
    }

    /// Append one signal, assigning the next sequence number for this pair.
    /// The record is synced to disk before this returns: an `Ok` means the
    /// signal durably happened, an `Err` means it never did.
    pub async fn append(&self, pair: &Pair, data: SignalData) -> Result<Signal, PipelineError> {
        let writer = self.writer_for(pair).await?;
        let mut writer = writer.lock().await;

        let signal = Signal::seal(pair, data, writer.next_sequence);
        let line = serde_json::to_string(&signal).map_err(|e| PipelineError::Corrupt {
            pair: pair.clone(),
            detail: format!("serialize: {e}"),
        })?;

        let io_err = |source| PipelineError::Durability {
            pair: pair.clone(),
            source,
        };
        writeln!(writer.file, "{line}").map_err(io_err)?;
        writer.file.sync_data().map_err(io_err)?;
        writer.next_sequence += 1;

        debug!(pair = %pair, seq = signal.sequence, kind = %signal.kind, "appended signal");
        Ok(signal)
    }

    /// Read all records with `sequence >= from_sequence`, in order. Finite:
    /// ends at the current end of log and can be polled again later. A
    /// malformed or out-of-order tail is tolerated by stopping early, never
    /// by failing the read.
    pub fn read_from(&self, pair: &Pair, from_sequence: u64) -> Result<Vec<Signal>, PipelineError> {
        let path = self.log_path(pair);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(PipelineError::Durability {
                    pair: pair.clone(),
                    source,
                })
            }
        };

        let mut signals = Vec::new();
        let mut expected = 1u64;
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!(pair = %pair, line = idx + 1, error = %e, "unreadable log line; truncating read");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let signal: Signal = match serde_json::from_str(&line) {
                Ok(s) => s,
                Err(e) => {
                    // Crash artifact: an incomplete trailing record.
                    warn!(pair = %pair, line = idx + 1, error = %e, "malformed log record; truncating read");
                    break;
                }
            };
            if signal.sequence != expected {
                warn!(
                    pair = %pair,
                    expected,
                    found = signal.sequence,
                    "sequence discontinuity; truncating read"
                );
                break;
            }
            expected += 1;
            if signal.sequence >= from_sequence {
                signals.push(signal);
            }
        }
        Ok(signals)
    }

    /// Highest durable sequence number in this pair's log (0 if empty).
    pub fn end_of_log(&self, pair: &Pair) -> Result<u64, PipelineError> {
        Ok(self.read_from(pair, 1)?.last().map(|s| s.sequence).unwrap_or(0))
    }

    /// Pairs that have a log file on disk.
    pub fn pairs(&self) -> Result<Vec<Pair>, std::io::Error> {
        let mut pairs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Some(pair) = Pair::from_file_stem(stem) {
                    pairs.push(pair);
                }
            }
        }
        pairs.sort_by_key(|p| p.file_stem());
        Ok(pairs)
    }

    async fn writer_for(&self, pair: &Pair) -> Result<Arc<Mutex<PairWriter>>, PipelineError> {
        let mut writers = self.writers.lock().await;
        if let Some(w) = writers.get(pair) {
            return Ok(w.clone());
        }

        let path = self.log_path(pair);
        let last = repair_tail(&path, pair).map_err(|source| PipelineError::Durability {
            pair: pair.clone(),
            source,
        })?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| PipelineError::Durability {
                pair: pair.clone(),
                source,
            })?;

        let writer = Arc::new(Mutex::new(PairWriter {
            file,
            next_sequence: last + 1,
        }));
        writers.insert(pair.clone(), writer.clone());
        Ok(writer)
    }
}

/// Scan an existing log, truncate any partial trailing record left by a
/// crash mid-write, and return the last valid sequence number. New appends
/// must never concatenate onto a torn line.
fn repair_tail(path: &Path, pair: &Pair) -> Result<u64, std::io::Error> {
    let content = match fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut last_seq = 0u64;
    let mut valid_end = 0usize;
    let mut offset = 0usize;
    for chunk in content.split_inclusive(|b| *b == b'\n') {
        let end = offset + chunk.len();
        let complete = chunk.last() == Some(&b'\n');
        let parsed = std::str::from_utf8(chunk)
            .ok()
            .and_then(|l| serde_json::from_str::<Signal>(l.trim_end()).ok());
        match parsed {
            Some(signal) if complete && signal.sequence == last_seq + 1 => {
                last_seq = signal.sequence;
                valid_end = end;
            }
            _ => break,
        }
        offset = end;
    }

    if valid_end < content.len() {
        warn!(
            pair = %pair,
            dropped_bytes = content.len() - valid_end,
            last_seq,
            "truncating partial trailing record"
        );
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_end as u64)?;
        file.sync_data()?;
    }
    Ok(last_seq)
}
