//! Engine: wires the whole pipeline together and owns its lifecycle.
//!
//! One scheduler task tree drives strategy runs; one dispatcher task per
//! pair tails that pair's log and delivers alerts. Shutdown is a watch
//! channel flipped by Ctrl+C: the scheduler stops ticking, each dispatcher
//! finishes its in-flight record, then the engine returns.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::dispatch::NotificationDispatcher;
use crate::gateway::{LogGateway, NotificationGateway, WebhookGateway};
use crate::governor::ExposureGovernor;
use crate::models::{Pair, PositionBook};
use crate::runner::StrategyRunner;
use crate::scheduler::Scheduler;
use crate::store::{CheckpointStore, SignalLogStore};
use crate::strategies::StrategyRegistry;
use crate::tailer::LogTailer;

pub struct Engine {
    config: AppConfig,
    registry: Arc<StrategyRegistry>,
    store: Arc<SignalLogStore>,
    checkpoints: Arc<CheckpointStore>,
    governor: Arc<ExposureGovernor>,
    gateway: Arc<dyn NotificationGateway>,
}

impl Engine {
    /// Open stores and validate the configuration against the registry.
    /// Every scheduled strategy id must resolve; a typo fails startup
    /// rather than silently never running.
    pub fn new(
        config: AppConfig,
        registry: StrategyRegistry,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Result<Self> {
        let store = Arc::new(
            SignalLogStore::open(&config.store.log_dir).context("cannot open signal log store")?,
        );
        let checkpoints = Arc::new(
            CheckpointStore::open(&config.store.checkpoint_dir)
                .context("cannot open checkpoint store")?,
        );
        let registry = Arc::new(registry);

        for entry in &config.schedule {
            registry
                .resolve(&entry.strategy)
                .with_context(|| format!("schedule references unknown strategy {:?}", entry.strategy))?;
        }

        let governor = Arc::new(ExposureGovernor::new(store.clone(), config.exposure.clone()));

        Ok(Self {
            config,
            registry,
            store,
            checkpoints,
            governor,
            gateway,
        })
    }

    /// Build the configured gateway. Dry-run forces the logging gateway.
    pub fn build_gateway(config: &AppConfig, dry_run: bool) -> Result<Arc<dyn NotificationGateway>> {
        if dry_run {
            return Ok(Arc::new(LogGateway));
        }
        match config.gateway.kind.as_str() {
            "log" => Ok(Arc::new(LogGateway)),
            "webhook" => {
                let url = config
                    .gateway
                    .url
                    .as_deref()
                    .context("gateway.url is required for the webhook gateway")?;
                Ok(Arc::new(WebhookGateway::new(url)?))
            }
            other => anyhow::bail!("unknown gateway kind {other:?}"),
        }
    }

    /// Run until the operator shutdown signal.
    pub async fn run(&self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
            shutdown_tx.send(true).ok();
        });

        // Dispatch every pair that is scheduled or already has a log on
        // disk; a pair removed from the schedule still drains its backlog.
        let mut dispatch_pairs: Vec<Pair> =
            self.config.schedule.iter().map(|s| s.pair()).collect();
        for pair in self.store.pairs().context("cannot list signal logs")? {
            if !dispatch_pairs.contains(&pair) {
                dispatch_pairs.push(pair);
            }
        }

        let mut dispatchers = Vec::new();
        for pair in dispatch_pairs {
            let tailer = LogTailer::resume(self.store.clone(), self.checkpoints.clone(), pair);
            let dispatcher = NotificationDispatcher::new(
                self.gateway.clone(),
                self.config.dispatch.clone(),
            );
            dispatchers.push(tokio::spawn(dispatcher.run(tailer, shutdown_rx.clone())));
        }

        let runner = Arc::new(StrategyRunner::new(
            self.registry.clone(),
            self.store.clone(),
            Duration::from_secs(self.config.runner.strategy_timeout_secs),
        ));
        let mut scheduler = Scheduler::new(runner, self.governor.clone());
        for schedule in &self.config.schedule {
            scheduler.register(schedule.to_entry());
        }

        info!(
            pairs = self.config.schedule.len(),
            strategies = ?self.registry.ids(),
            "pipeline started"
        );
        scheduler.run(shutdown_rx.clone()).await;

        for joined in join_all(dispatchers).await {
            if let Err(e) = joined {
                error!(error = %e, "dispatcher task panicked");
            }
        }
        info!("pipeline stopped");
        Ok(())
    }

    /// Per-pair log/checkpoint status, for the `status` subcommand.
    pub fn status(&self) -> Result<Vec<PairStatus>> {
        let mut rows = Vec::new();
        for pair in self.store.pairs().context("cannot list signal logs")? {
            let end_of_log = self.store.end_of_log(&pair)?;
            let acknowledged = self.checkpoints.load(&pair);
            rows.push(PairStatus {
                pair,
                end_of_log,
                acknowledged,
            });
        }
        Ok(rows)
    }

    /// Replay-derived open positions, for the `positions` subcommand.
    pub async fn positions(&self) -> PositionBook {
        self.governor.positions().await
    }
}

/// One row of `status` output.
#[derive(Debug, Clone)]
pub struct PairStatus {
    pub pair: Pair,
    pub end_of_log: u64,
    pub acknowledged: u64,
}

impl PairStatus {
    /// Records logged but not yet acknowledged by the dispatcher.
    pub fn lag(&self) -> u64 {
        self.end_of_log.saturating_sub(self.acknowledged)
    }
}

impl fmt::Display for PairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<28} {:>8} {:>12} {:>6}",
            self.pair.to_string(),
            self.end_of_log,
            self.acknowledged,
            self.lag()
        )
    }
}
