//! Error taxonomy for the pipeline.
//!
//! Every variant carries the pair identity so operators can attribute a
//! failure without grepping. None of these terminate the process: strategy
//! and delivery errors isolate to one tick or one record, durability errors
//! mean "the signal never happened" to the caller.

use crate::models::Pair;

/// Component-level failures surfaced to the orchestration layer.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The opaque strategy function returned an error.
    #[error("strategy {pair} failed: {message}")]
    Strategy { pair: Pair, message: String },

    /// The strategy exceeded its time budget. Side effects beyond the
    /// return value are not trusted.
    #[error("strategy {pair} timed out after {budget_secs}s")]
    StrategyTimeout { pair: Pair, budget_secs: u64 },

    /// Append or checkpoint write failed. The caller must treat the signal
    /// as not-yet-happened; nothing downstream may observe it.
    #[error("durable write failed for {pair}")]
    Durability {
        pair: Pair,
        #[source]
        source: std::io::Error,
    },

    /// Log content that could not be interpreted past the tolerated
    /// truncated tail.
    #[error("corrupt log for {pair}: {detail}")]
    Corrupt { pair: Pair, detail: String },

    /// A schedule entry references a strategy id the registry does not know.
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),
}

/// Outcome classification for one gateway delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network trouble, rate limiting, 5xx: worth retrying with backoff.
    #[error("retryable gateway failure: {0}")]
    Retryable(String),

    /// Malformed message or permanently invalid destination: never retried.
    #[error("fatal gateway failure: {0}")]
    Fatal(String),
}
