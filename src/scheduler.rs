//! Per-pair periodic scheduling.
//!
//! Each registered (strategy, timeframe) pair gets its own timer task. Ticks
//! are aligned to candle-close boundaries and measured from the previous
//! scheduled tick, not the previous completion (fixed cadence: a slow run
//! does not push later runs forward). The timer task only dispatches; the
//! strategy invocation itself is spawned so one pair's slow strategy never
//! stalls another pair's clock.
//!
//! Overlap rule per tick: run lock held -> log an overrun and skip (no
//! backlog); exposure gate denies -> skip quietly; otherwise acquire the
//! lock, run, release unconditionally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::governor::{ExposureGovernor, Gate};
use crate::models::Pair;
use crate::runner::StrategyRunner;

/// One registered schedule: a pair, the symbol it trades, its capital
/// allocation, and the tick interval.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub pair: Pair,
    pub symbol: String,
    pub capital: Decimal,
    pub interval: Duration,
}

pub struct Scheduler {
    runner: Arc<StrategyRunner>,
    governor: Arc<ExposureGovernor>,
    entries: Vec<ScheduleEntry>,
}

impl Scheduler {
    pub fn new(runner: Arc<StrategyRunner>, governor: Arc<ExposureGovernor>) -> Self {
        Self {
            runner,
            governor,
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, entry: ScheduleEntry) {
        info!(
            pair = %entry.pair,
            symbol = %entry.symbol,
            interval_secs = entry.interval.as_secs(),
            "registered schedule"
        );
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Run every registered pair until shutdown. Returns once all pair tasks
    /// have stopped; in-flight strategy invocations are awaited by their own
    /// timeout budgets, not interrupted here.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let mut handles = Vec::new();
        for entry in self.entries {
            let runner = self.runner.clone();
            let governor = self.governor.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(pair_loop(entry, runner, governor, shutdown)));
        }
        for handle in handles {
            // A panicking pair task is isolated; the others keep running.
            if let Err(e) = handle.await {
                error!(error = %e, "scheduler pair task panicked");
            }
        }
        info!("scheduler stopped");
    }
}

/// Delay until the next wall-clock boundary of `interval` (candle close),
/// so a 5m schedule fires at :00, :05, :10 rather than at process start.
fn next_boundary_delay(interval: Duration) -> Duration {
    let secs = interval.as_secs().max(1);
    let now = Utc::now().timestamp() as u64;
    let into = now % secs;
    Duration::from_secs(secs - into)
}

async fn pair_loop(
    entry: ScheduleEntry,
    runner: Arc<StrategyRunner>,
    governor: Arc<ExposureGovernor>,
    mut shutdown: watch::Receiver<bool>,
) {
    let start = Instant::now() + next_boundary_delay(entry.interval);
    let mut ticker = interval_at(start, entry.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Held while one invocation of this pair is in flight. Process-local by
    // design: a dead process cannot leave a tick permanently blocked.
    let run_lock = Arc::new(AtomicBool::new(false));

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if run_lock.load(Ordering::Acquire) {
                    warn!(pair = %entry.pair, "previous run still in flight; skipping tick (overrun)");
                    continue;
                }

                match governor.can_run(&entry.pair.strategy_id, &entry.symbol).await {
                    Gate::Deny(reason) => {
                        info!(pair = %entry.pair, symbol = %entry.symbol, reason = %reason, "tick gated");
                        continue;
                    }
                    Gate::Allow => {}
                }

                // Only this timer task acquires the lock, so load-then-store
                // cannot race.
                run_lock.store(true, Ordering::Release);
                let runner = runner.clone();
                let lock = run_lock.clone();
                let pair = entry.pair.clone();
                let symbol = entry.symbol.clone();
                let capital = entry.capital;
                tokio::spawn(async move {
                    if let Err(e) = runner.execute(&pair, &symbol, capital).await {
                        error!(pair = %pair, error = %e, "strategy run failed");
                    }
                    lock.store(false, Ordering::Release);
                });
            }
        }
    }
    info!(pair = %entry.pair, "pair schedule stopped");
}
