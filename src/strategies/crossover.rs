//! Moving-average crossover: a minimal built-in strategy.
//!
//! Exists so a fresh deployment has something registered; real indicator
//! work belongs in external strategy implementations behind the same trait.
//! Emits ENTRY_LONG when the fast mean crosses above the slow mean and
//! ENTRY_SHORT on the opposite cross. Exits are a separate strategy's job.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::models::{SignalData, SignalKind, Timeframe};

use super::Strategy;

/// Source of recent close prices, newest last. The pipeline does not care
/// where candles come from; live deployments wire a broker feed in here.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn closes(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> anyhow::Result<Vec<Decimal>>;
}

pub struct MaCrossoverStrategy {
    id: String,
    feed: Box<dyn PriceFeed>,
    fast: usize,
    slow: usize,
}

impl MaCrossoverStrategy {
    pub fn new(id: impl Into<String>, feed: Box<dyn PriceFeed>, fast: usize, slow: usize) -> Self {
        assert!(fast < slow, "fast period must be shorter than slow");
        Self {
            id: id.into(),
            feed,
            fast,
            slow,
        }
    }

    fn mean(window: &[Decimal]) -> Decimal {
        window.iter().copied().sum::<Decimal>() / Decimal::from(window.len())
    }
}

#[async_trait]
impl Strategy for MaCrossoverStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn time_budget(&self) -> Duration {
        Duration::from_secs(20)
    }

    async fn evaluate(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        _capital: Decimal,
    ) -> anyhow::Result<Option<SignalData>> {
        // One extra candle so both the previous and the current crossover
        // state are observable.
        let closes = self.feed.closes(symbol, timeframe, self.slow + 1).await?;
        if closes.len() < self.slow + 1 {
            return Ok(None);
        }

        let prev = &closes[..closes.len() - 1];
        let curr = &closes[1..];

        let prev_fast = Self::mean(&prev[prev.len() - self.fast..]);
        let prev_slow = Self::mean(&prev[prev.len() - self.slow..]);
        let curr_fast = Self::mean(&curr[curr.len() - self.fast..]);
        let curr_slow = Self::mean(&curr[curr.len() - self.slow..]);

        let kind = if prev_fast <= prev_slow && curr_fast > curr_slow {
            SignalKind::EntryLong
        } else if prev_fast >= prev_slow && curr_fast < curr_slow {
            SignalKind::EntryShort
        } else {
            return Ok(None);
        };

        let last_close = closes[closes.len() - 1];
        Ok(Some(SignalData {
            symbol: symbol.to_string(),
            kind,
            entry_price: last_close,
            timestamp: Utc::now(),
            note: Some(format!(
                "fast MA({}) crossed {} slow MA({})",
                self.fast,
                if kind == SignalKind::EntryLong { "above" } else { "below" },
                self.slow
            )),
        }))
    }
}
