//! Derived open-position state, rebuilt by replaying a pair's signal log.
//!
//! Nothing here is persisted: the log is the source of truth and the book is
//! a pure fold over it. Anomalous sequences (an EXIT with no open position,
//! an ENTRY while one is already open) count as open, so the governor is
//! never more permissive than reality.

use std::collections::HashMap;

use tracing::warn;

use crate::models::{Signal, SignalKind};

/// Replay state for one (strategy, symbol) slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Closed,
    Open,
    /// Open because of an anomalous replay (unmatched EXIT or duplicate
    /// ENTRY); consumes exposure cap until a matching EXIT arrives.
    AnomalousOpen,
}

impl SlotState {
    pub fn is_open(&self) -> bool {
        !matches!(self, SlotState::Closed)
    }
}

/// Open-position book for any number of (strategy, symbol) slots.
#[derive(Debug, Default, Clone)]
pub struct PositionBook {
    slots: HashMap<(String, String), SlotState>,
    anomalies: u64,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one signal into the book, in sequence order.
    pub fn apply(&mut self, signal: &Signal) {
        let key = (signal.strategy_id.clone(), signal.symbol.clone());
        let state = self.slots.entry(key).or_insert(SlotState::Closed);

        match (signal.kind, *state) {
            (k, SlotState::Closed) if k.is_entry() => *state = SlotState::Open,
            (k, SlotState::Open | SlotState::AnomalousOpen) if k.is_entry() => {
                self.anomalies += 1;
                warn!(
                    strategy = %signal.strategy_id,
                    symbol = %signal.symbol,
                    seq = signal.sequence,
                    "duplicate ENTRY while position open; keeping position open"
                );
                *state = SlotState::AnomalousOpen;
            }
            (SignalKind::Exit, SlotState::Open | SlotState::AnomalousOpen) => {
                *state = SlotState::Closed;
            }
            (SignalKind::Exit, SlotState::Closed) => {
                self.anomalies += 1;
                warn!(
                    strategy = %signal.strategy_id,
                    symbol = %signal.symbol,
                    seq = signal.sequence,
                    "EXIT with no open position; counting slot as open (fail-safe)"
                );
                *state = SlotState::AnomalousOpen;
            }
            _ => unreachable!("entry/exit cases are exhaustive"),
        }
    }

    /// Open positions for one strategy, across all symbols.
    pub fn open_for_strategy(&self, strategy_id: &str) -> usize {
        self.slots
            .iter()
            .filter(|((s, _), state)| s == strategy_id && state.is_open())
            .count()
    }

    /// Open positions across every strategy.
    pub fn open_total(&self) -> usize {
        self.slots.values().filter(|s| s.is_open()).count()
    }

    pub fn slot(&self, strategy_id: &str, symbol: &str) -> SlotState {
        self.slots
            .get(&(strategy_id.to_string(), symbol.to_string()))
            .copied()
            .unwrap_or(SlotState::Closed)
    }

    /// Replay anomalies observed so far (diagnostic only).
    pub fn anomaly_count(&self) -> u64 {
        self.anomalies
    }

    /// All currently open (strategy, symbol) slots, for status output.
    pub fn open_slots(&self) -> Vec<(String, String, SlotState)> {
        let mut open: Vec<_> = self
            .slots
            .iter()
            .filter(|(_, state)| state.is_open())
            .map(|((s, sym), state)| (s.clone(), sym.clone(), *state))
            .collect();
        open.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        open
    }
}
