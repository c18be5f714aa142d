//! Strategy runner: one timeout-bounded invocation, one optional append.
//!
//! The append is the durability boundary. A signal that fails to durably
//! append is treated as never having happened; nothing downstream may see it.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::models::{Pair, Signal};
use crate::store::SignalLogStore;
use crate::strategies::StrategyRegistry;

pub struct StrategyRunner {
    registry: Arc<StrategyRegistry>,
    store: Arc<SignalLogStore>,
    /// Hard ceiling on any strategy's declared time budget.
    max_budget: Duration,
}

impl StrategyRunner {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        store: Arc<SignalLogStore>,
        max_budget: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            max_budget,
        }
    }

    /// Invoke the pair's strategy once. Outcomes:
    /// - `Ok(None)`: clean run, no signal this tick
    /// - `Ok(Some(signal))`: signal durably appended with its sequence number
    /// - `Err(_)`: strategy failure, timeout, or append failure; isolated to
    ///   this tick and reported by the caller
    pub async fn execute(
        &self,
        pair: &Pair,
        symbol: &str,
        capital: Decimal,
    ) -> Result<Option<Signal>, PipelineError> {
        let strategy = self.registry.resolve(&pair.strategy_id)?;
        let budget = strategy.time_budget().min(self.max_budget);

        let outcome =
            tokio::time::timeout(budget, strategy.evaluate(symbol, pair.timeframe, capital)).await;

        let data = match outcome {
            Err(_) => {
                return Err(PipelineError::StrategyTimeout {
                    pair: pair.clone(),
                    budget_secs: budget.as_secs(),
                })
            }
            Ok(Err(e)) => {
                return Err(PipelineError::Strategy {
                    pair: pair.clone(),
                    message: format!("{e:#}"),
                })
            }
            Ok(Ok(None)) => {
                debug!(pair = %pair, symbol, "no signal this tick");
                return Ok(None);
            }
            Ok(Ok(Some(data))) => data,
        };

        let signal = self.store.append(pair, data).await?;
        info!(
            pair = %pair,
            symbol = %signal.symbol,
            kind = %signal.kind,
            seq = signal.sequence,
            price = %signal.entry_price,
            "signal recorded"
        );
        Ok(Some(signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SignalData, SignalKind, Timeframe};
    use crate::strategies::Strategy;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    enum Script {
        Signal,
        Nothing,
        Fail,
        Hang,
    }

    struct Scripted {
        id: String,
        script: Script,
    }

    #[async_trait]
    impl Strategy for Scripted {
        fn id(&self) -> &str {
            &self.id
        }

        fn time_budget(&self) -> Duration {
            Duration::from_millis(50)
        }

        async fn evaluate(
            &self,
            symbol: &str,
            _timeframe: Timeframe,
            _capital: Decimal,
        ) -> anyhow::Result<Option<SignalData>> {
            match self.script {
                Script::Signal => Ok(Some(SignalData {
                    symbol: symbol.to_string(),
                    kind: SignalKind::EntryLong,
                    entry_price: dec!(20050),
                    timestamp: Utc::now(),
                    note: None,
                })),
                Script::Nothing => Ok(None),
                Script::Fail => anyhow::bail!("indicator blew up"),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(None)
                }
            }
        }
    }

    fn runner(dir: &std::path::Path, script: Script) -> (StrategyRunner, Pair) {
        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(Scripted {
            id: "s".to_string(),
            script,
        }));
        let store = Arc::new(SignalLogStore::open(dir).unwrap());
        let runner = StrategyRunner::new(
            Arc::new(registry),
            store,
            Duration::from_secs(5),
        );
        (runner, Pair::new("s", Timeframe::M5))
    }

    #[tokio::test]
    async fn test_signal_is_appended_with_sequence() {
        let tmp = tempfile::tempdir().unwrap();
        let (runner, pair) = runner(tmp.path(), Script::Signal);

        let signal = runner.execute(&pair, "NIFTY", dec!(100000)).await.unwrap().unwrap();
        assert_eq!(signal.sequence, 1);

        let logged = runner.store.read_from(&pair, 1).unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].content_hash, signal.content_hash);
    }

    #[tokio::test]
    async fn test_no_signal_appends_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let (runner, pair) = runner(tmp.path(), Script::Nothing);

        assert!(runner.execute(&pair, "NIFTY", dec!(100000)).await.unwrap().is_none());
        assert!(runner.store.read_from(&pair, 1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_strategy_failure_is_classified() {
        let tmp = tempfile::tempdir().unwrap();
        let (runner, pair) = runner(tmp.path(), Script::Fail);

        let err = runner.execute(&pair, "NIFTY", dec!(100000)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Strategy { .. }));
        assert!(runner.store.read_from(&pair, 1).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_strategy_times_out() {
        let tmp = tempfile::tempdir().unwrap();
        let (runner, pair) = runner(tmp.path(), Script::Hang);

        let err = runner.execute(&pair, "NIFTY", dec!(100000)).await.unwrap_err();
        assert!(matches!(err, PipelineError::StrategyTimeout { .. }));
    }

    #[tokio::test]
    async fn test_unknown_strategy_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (runner, _) = runner(tmp.path(), Script::Nothing);
        let ghost = Pair::new("ghost", Timeframe::M5);

        let err = runner.execute(&ghost, "NIFTY", dec!(1)).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnknownStrategy(_)));
    }
}
