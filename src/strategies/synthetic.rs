//! Deterministic synthetic price feed for dry runs.
//!
//! Produces a pseudo-random walk derived from a hash of (symbol, candle
//! index), so the same symbol always replays the same series. This is the
//! paper-trading data source; live deployments implement [`PriceFeed`]
//! against a broker instead.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::models::Timeframe;

use super::PriceFeed;

pub struct SyntheticFeed;

impl SyntheticFeed {
    fn step(symbol: &str, index: i64) -> Decimal {
        let mut hasher = Sha256::new();
        hasher.update(symbol.as_bytes());
        hasher.update(index.to_le_bytes());
        let digest = hasher.finalize();
        // Map the first hash byte onto a small signed step in basis points.
        let raw = digest[0] as i64 - 128;
        Decimal::new(raw, 4)
    }
}

#[async_trait]
impl PriceFeed for SyntheticFeed {
    async fn closes(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> anyhow::Result<Vec<Decimal>> {
        // Anchor the series to the current candle so successive polls see
        // the walk advance.
        let candle_secs = (timeframe.minutes() * 60) as i64;
        let head = Utc::now().timestamp() / candle_secs;

        let base = Decimal::from(100);
        let mut closes = Vec::with_capacity(count);
        for i in 0..count as i64 {
            let index = head - (count as i64 - 1) + i;
            // Cumulative walk: base * (1 + sum of steps), kept simple and
            // strictly positive for demo purposes.
            let mut price = base;
            for j in (index - 16)..=index {
                price += Self::step(symbol, j);
            }
            closes.push(price.max(Decimal::ONE));
        }
        Ok(closes)
    }
}
