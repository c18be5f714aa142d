//! Strategy capability interface and registry.
//!
//! A strategy is an opaque async function from (symbol, timeframe, capital)
//! to zero-or-one signal. The pipeline never looks inside: indicator math,
//! data fetching and parameterization are the strategy author's business.
//! Strategies are resolved by id at startup through the registry; there is
//! no runtime reflection.

mod crossover;
mod synthetic;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::PipelineError;
use crate::models::{SignalData, Timeframe};

pub use crossover::{MaCrossoverStrategy, PriceFeed};
pub use synthetic::SyntheticFeed;

/// One independent trading-signal generator.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Stable identifier used in configuration, log file names and alerts.
    fn id(&self) -> &str;

    /// Per-invocation time budget. The runner enforces it; a strategy that
    /// overruns is treated as failed and its side effects are not trusted.
    fn time_budget(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Evaluate the market once. `Ok(None)` means no signal this tick.
    async fn evaluate(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        capital: Decimal,
    ) -> anyhow::Result<Option<SignalData>>;
}

/// Id -> implementation map, built once at startup.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies.insert(strategy.id().to_string(), strategy);
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<dyn Strategy>, PipelineError> {
        self.strategies
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownStrategy(id.to_string()))
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.strategies.keys().cloned().collect();
        ids.sort();
        ids
    }
}
