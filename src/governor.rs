//! Exposure governor: gates new strategy runs on replay-derived open
//! positions.
//!
//! The governor is a read-only consumer of the signal logs. It keeps a
//! running tally (one position book plus a per-pair cursor) and refreshes it
//! incrementally before each gating decision; a detected log truncation
//! rebuilds the tally from scratch. A slightly stale view is acceptable —
//! the per-pair run lock already prevents concurrent runs of the same pair —
//! but anomalies always count toward the caps.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::{Pair, PositionBook};
use crate::store::SignalLogStore;

/// Caps on concurrently open positions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExposureConfig {
    /// Max open positions per strategy (across symbols and timeframes)
    pub max_open_per_strategy: usize,

    /// Max open positions across all strategies
    pub max_open_global: usize,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            max_open_per_strategy: 3,
            max_open_global: 10,
        }
    }
}

/// Gating decision for one prospective run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Allow,
    Deny(String),
}

#[derive(Default)]
struct Tally {
    book: PositionBook,
    cursors: HashMap<Pair, u64>,
}

pub struct ExposureGovernor {
    store: Arc<SignalLogStore>,
    config: ExposureConfig,
    tally: Mutex<Tally>,
}

impl ExposureGovernor {
    pub fn new(store: Arc<SignalLogStore>, config: ExposureConfig) -> Self {
        Self {
            store,
            config,
            tally: Mutex::new(Tally::default()),
        }
    }

    /// Decide whether a run for (strategy, symbol) may start now.
    pub async fn can_run(&self, strategy_id: &str, symbol: &str) -> Gate {
        let mut tally = self.tally.lock().await;
        self.refresh(&mut tally);

        let open_strategy = tally.book.open_for_strategy(strategy_id);
        if open_strategy >= self.config.max_open_per_strategy {
            return Gate::Deny(format!(
                "strategy {strategy_id} has {open_strategy} open positions (cap {})",
                self.config.max_open_per_strategy
            ));
        }

        let open_total = tally.book.open_total();
        if open_total >= self.config.max_open_global {
            return Gate::Deny(format!(
                "{open_total} open positions globally (cap {})",
                self.config.max_open_global
            ));
        }

        debug!(
            strategy = strategy_id,
            symbol,
            open_strategy,
            open_total,
            "exposure gate allows run"
        );
        Gate::Allow
    }

    /// Current position book snapshot (refreshed), for status output.
    pub async fn positions(&self) -> PositionBook {
        let mut tally = self.tally.lock().await;
        self.refresh(&mut tally);
        tally.book.clone()
    }

    /// Fold any new log records into the tally. Read errors leave the tally
    /// stale rather than blocking the gate; truncation rebuilds from scratch.
    fn refresh(&self, tally: &mut Tally) {
        let pairs = match self.store.pairs() {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!(error = %e, "cannot list signal logs; using stale exposure view");
                return;
            }
        };

        for pair in &pairs {
            let cursor = tally.cursors.get(pair).copied().unwrap_or(0);
            let fresh = match self.store.read_from(pair, cursor + 1) {
                Ok(f) => f,
                Err(e) => {
                    warn!(pair = %pair, error = %e, "exposure refresh read failed");
                    continue;
                }
            };

            // A log that ends below our cursor has been truncated out from
            // under us; the incremental tally is no longer trustworthy.
            if fresh.is_empty() {
                match self.store.end_of_log(pair) {
                    Ok(end) if end < cursor => {
                        warn!(pair = %pair, cursor, end, "log truncation detected; rebuilding exposure tally");
                        *tally = Tally::default();
                        return self.refresh(tally);
                    }
                    _ => continue,
                }
            }

            for signal in &fresh {
                tally.book.apply(signal);
            }
            if let Some(last) = fresh.last() {
                tally.cursors.insert(pair.clone(), last.sequence);
            }
        }
    }
}
