//! Notification dispatcher: drains a pair's tailer and delivers each signal
//! to the gateway with bounded retries.
//!
//! Delivery semantics are at-least-once from this side; end-to-end
//! exactly-once comes from the idempotency key (`content_hash`) plus a local
//! recently-delivered cache covering the crash window between delivery and
//! checkpoint persistence. One stuck record never blocks the stream: after
//! the retry budget (or a fatal gateway error) the record is abandoned at
//! error severity and the checkpoint still advances — the signal log remains
//! the durable record of truth.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::GatewayError;
use crate::gateway::NotificationGateway;
use crate::models::Signal;
use crate::tailer::LogTailer;

/// Dispatcher tuning knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How often to poll the log when caught up (milliseconds)
    pub poll_interval_ms: u64,

    /// Total delivery attempts per record before abandoning
    pub max_attempts: u32,

    /// First retry delay (milliseconds)
    pub initial_backoff_ms: u64,

    /// Retry delay ceiling (milliseconds)
    pub max_backoff_ms: u64,

    /// Bounded retention of recently delivered idempotency keys
    pub dedup_cache_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            dedup_cache_size: 1_024,
        }
    }
}

/// Terminal outcome for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Delivered,
    /// Idempotency-key hit in the dedup cache; nothing sent.
    Duplicate,
    /// Retry budget exhausted or fatal gateway error.
    Abandoned,
}

/// Bounded FIFO set of recently delivered idempotency keys.
struct DedupCache {
    keys: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl DedupCache {
    fn new(capacity: usize) -> Self {
        Self {
            keys: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn insert(&mut self, key: String) {
        if !self.keys.insert(key.clone()) {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.keys.remove(&evicted);
            }
        }
    }
}

pub struct NotificationDispatcher {
    gateway: Arc<dyn NotificationGateway>,
    config: DispatchConfig,
    recently_delivered: DedupCache,
}

impl NotificationDispatcher {
    pub fn new(gateway: Arc<dyn NotificationGateway>, config: DispatchConfig) -> Self {
        let cache = DedupCache::new(config.dedup_cache_size);
        Self {
            gateway,
            config,
            recently_delivered: cache,
        }
    }

    /// Deliver one signal to a terminal outcome. Never returns an error:
    /// every failure mode resolves to `Abandoned`.
    pub async fn handle(&mut self, signal: &Signal) -> Handled {
        if self.recently_delivered.contains(&signal.content_hash) {
            debug!(
                pair = %signal.pair(),
                seq = signal.sequence,
                "already delivered; skipping redelivery"
            );
            return Handled::Duplicate;
        }

        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.config.max_backoff_ms))
            .with_max_elapsed_time(None)
            .build();

        let message = signal.alert_message();
        for attempt in 1..=self.config.max_attempts {
            match self.gateway.deliver(&signal.content_hash, &message).await {
                Ok(()) => {
                    info!(
                        pair = %signal.pair(),
                        seq = signal.sequence,
                        attempt,
                        "alert delivered"
                    );
                    self.recently_delivered.insert(signal.content_hash.clone());
                    return Handled::Delivered;
                }
                Err(GatewayError::Fatal(reason)) => {
                    error!(
                        pair = %signal.pair(),
                        seq = signal.sequence,
                        attempt,
                        reason = %reason,
                        "fatal gateway error; abandoning record"
                    );
                    return Handled::Abandoned;
                }
                Err(GatewayError::Retryable(reason)) => {
                    if attempt == self.config.max_attempts {
                        error!(
                            pair = %signal.pair(),
                            seq = signal.sequence,
                            attempts = attempt,
                            reason = %reason,
                            "retry budget exhausted; abandoning record"
                        );
                        return Handled::Abandoned;
                    }
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or(Duration::from_millis(self.config.max_backoff_ms));
                    warn!(
                        pair = %signal.pair(),
                        seq = signal.sequence,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "transient gateway failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        // Only reachable with max_attempts == 0.
        Handled::Abandoned
    }

    /// Poll-deliver-acknowledge loop for one pair. Checkpoint advancement is
    /// strictly sequential: record N reaches a terminal outcome before N+1 is
    /// attempted. Shutdown is honored between records, never mid-record, so
    /// the checkpoint only ever covers decided outcomes.
    pub async fn run(mut self, mut tailer: LogTailer, mut shutdown: watch::Receiver<bool>) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        info!(pair = %tailer.pair(), "dispatcher started");

        'outer: loop {
            let batch = match tailer.poll() {
                Ok(batch) => batch,
                Err(e) => {
                    error!(pair = %tailer.pair(), error = %e, "tailer poll failed");
                    Vec::new()
                }
            };

            for signal in batch {
                let outcome = self.handle(&signal).await;
                if outcome == Handled::Abandoned {
                    warn!(
                        pair = %tailer.pair(),
                        seq = signal.sequence,
                        "advancing checkpoint past abandoned record"
                    );
                }
                if let Err(e) = tailer.acknowledge(signal.sequence) {
                    // Handled but not durably acknowledged: the record will
                    // be redelivered after restart and deduplicated.
                    error!(pair = %tailer.pair(), seq = signal.sequence, error = %e, "checkpoint write failed");
                }
                if *shutdown.borrow() {
                    break 'outer;
                }
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
        info!(pair = %tailer.pair(), acknowledged = tailer.acknowledged(), "dispatcher stopped");
    }
}
