//! Durable storage: append-only signal logs and atomic checkpoints.

mod checkpoint;
mod log;

pub use checkpoint::CheckpointStore;
pub use log::SignalLogStore;
