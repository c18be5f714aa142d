//! Durable multi-timeframe trading-signal pipeline.
//!
//! Independently scheduled strategies write zero-or-one signal per tick
//! into per-pair append-only logs; checkpointed tailers deliver each signal
//! to a notification gateway exactly once end-to-end, and an exposure
//! governor replays the logs to cap concurrently open positions.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod governor;
pub mod models;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod strategies;
pub mod tailer;

pub use config::AppConfig;
pub use engine::Engine;
pub use error::{GatewayError, PipelineError};
pub use models::{Pair, Signal, SignalData, SignalKind, Timeframe};
