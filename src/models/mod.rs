//! Domain models: signals, pairs, and replay-derived positions.

mod position;
mod signal;

pub use position::{PositionBook, SlotState};
pub use signal::{Pair, Signal, SignalData, SignalKind, Timeframe};
