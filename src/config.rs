//! Application configuration: a TOML file loaded once at startup.
//!
//! The core never mutates configuration at runtime. Every section has
//! defaults, so a minimal file only needs `[[schedule]]` entries.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::dispatch::DispatchConfig;
use crate::governor::ExposureConfig;
use crate::models::{Pair, Timeframe};
use crate::scheduler::ScheduleEntry;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub schedule: Vec<ScheduleConfig>,
    pub exposure: ExposureConfig,
    pub dispatch: DispatchConfig,
    pub gateway: GatewayConfig,
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding per-pair signal logs
    pub log_dir: PathBuf,

    /// Directory holding per-pair delivery checkpoints
    pub checkpoint_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("data/signals"),
            checkpoint_dir: PathBuf::from("data/checkpoints"),
        }
    }
}

/// One scheduled (strategy, timeframe, symbol) run.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Strategy id, resolved against the registry at startup
    pub strategy: String,

    /// Candle timeframe, e.g. "5m"
    pub timeframe: Timeframe,

    /// Instrument symbol passed to the strategy
    pub symbol: String,

    /// Capital allocation passed to the strategy
    pub capital: Decimal,

    /// Tick interval in seconds; defaults to one candle length
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

impl ScheduleConfig {
    pub fn pair(&self) -> Pair {
        Pair::new(self.strategy.clone(), self.timeframe)
    }

    pub fn to_entry(&self) -> ScheduleEntry {
        let interval_secs = self.interval_secs.unwrap_or(self.timeframe.minutes() * 60);
        ScheduleEntry {
            pair: self.pair(),
            symbol: self.symbol.clone(),
            capital: self.capital,
            interval: Duration::from_secs(interval_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// "log" or "webhook"
    pub kind: String,

    /// Destination URL, required for the webhook kind
    pub url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: "log".to_string(),
            url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Hard ceiling on any strategy's per-invocation time budget
    pub strategy_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            strategy_timeout_secs: 60,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("cannot parse config file {}", path.display()))
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!(path = %path.display(), "config file not found; using defaults");
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_parses() {
        let config: AppConfig = toml::from_str(
            r#"
            [[schedule]]
            strategy = "ma_crossover"
            timeframe = "5m"
            symbol = "XAUUSD"
            capital = "100000"

            [[schedule]]
            strategy = "supertrend_rsi"
            timeframe = "15m"
            symbol = "EURUSD"
            capital = "50000"
            interval_secs = 60

            [exposure]
            max_open_per_strategy = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.schedule.len(), 2);
        assert_eq!(config.exposure.max_open_per_strategy, 1);

        let first = config.schedule[0].to_entry();
        assert_eq!(first.pair, Pair::new("ma_crossover", Timeframe::M5));
        assert_eq!(first.interval, Duration::from_secs(300));

        let second = config.schedule[1].to_entry();
        assert_eq!(second.interval, Duration::from_secs(60));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.schedule.is_empty());
        assert_eq!(config.gateway.kind, "log");
        assert_eq!(config.dispatch.max_attempts, 5);
        assert_eq!(config.store.log_dir, PathBuf::from("data/signals"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = toml::from_str::<AppConfig>("[stroe]\nlog_dir = \"x\"").unwrap_err();
        assert!(err.to_string().contains("stroe"));
    }
}
