//! signal-relay CLI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use signal_relay::engine::Engine;
use signal_relay::strategies::{MaCrossoverStrategy, StrategyRegistry, SyntheticFeed};
use signal_relay::AppConfig;

/// Durable multi-timeframe trading-signal pipeline.
#[derive(Parser)]
#[command(name = "signal-relay")]
#[command(about = "Schedule strategies, log their signals durably, deliver alerts exactly once", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline until Ctrl+C
    Run {
        /// Log alerts instead of calling the configured gateway
        #[arg(long)]
        dry_run: bool,
    },

    /// Show per-pair log and checkpoint status
    Status,

    /// Show open positions derived from the signal logs
    Positions,

    /// Show the effective configuration
    Config,
}

/// Built-in strategies, wired to the synthetic paper-trading feed. Live
/// deployments register their own implementations here.
fn build_registry() -> StrategyRegistry {
    let mut registry = StrategyRegistry::new();
    registry.register(Arc::new(MaCrossoverStrategy::new(
        "ma_crossover",
        Box::new(SyntheticFeed),
        9,
        21,
    )));
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = AppConfig::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Run { dry_run } => {
            if config.schedule.is_empty() {
                println!(
                    "No schedules configured. Add [[schedule]] entries to {}.",
                    cli.config.display()
                );
                return Ok(());
            }

            let gateway = Engine::build_gateway(&config, dry_run)?;
            let engine = Engine::new(config, build_registry(), gateway)?;

            info!(dry_run, "starting signal-relay");
            println!("\n=== signal-relay ===");
            println!("Mode: {}", if dry_run { "DRY RUN (alerts logged only)" } else { "LIVE" });
            println!("Press Ctrl+C to stop.\n");

            engine.run().await?;
        }

        Commands::Status => {
            let gateway = Engine::build_gateway(&config, true)?;
            let engine = Engine::new(config, build_registry(), gateway)?;

            let rows = engine.status()?;
            if rows.is_empty() {
                println!("No signal logs yet. Run 'signal-relay run' to start the pipeline.");
                return Ok(());
            }

            println!("\n{:<28} {:>8} {:>12} {:>6}", "PAIR", "LOGGED", "ACKNOWLEDGED", "LAG");
            println!("{}", "-".repeat(58));
            for row in rows {
                println!("{row}");
            }
        }

        Commands::Positions => {
            let gateway = Engine::build_gateway(&config, true)?;
            let engine = Engine::new(config, build_registry(), gateway)?;

            let book = engine.positions().await;
            let open = book.open_slots();
            if open.is_empty() {
                println!("No open positions.");
            } else {
                println!("\n{:<20} {:<12} {:<10}", "STRATEGY", "SYMBOL", "STATE");
                println!("{}", "-".repeat(44));
                for (strategy, symbol, state) in open {
                    println!("{strategy:<20} {symbol:<12} {state:?}");
                }
            }
            if book.anomaly_count() > 0 {
                println!("\nReplay anomalies: {}", book.anomaly_count());
            }
        }

        Commands::Config => {
            println!("\n=== Store ===");
            println!("Log dir:              {}", config.store.log_dir.display());
            println!("Checkpoint dir:       {}", config.store.checkpoint_dir.display());

            println!("\n=== Schedules ({}) ===", config.schedule.len());
            for s in &config.schedule {
                let entry = s.to_entry();
                println!(
                    "  {:<28} {:<10} capital {:<12} every {}s",
                    entry.pair.to_string(),
                    s.symbol,
                    s.capital,
                    entry.interval.as_secs()
                );
            }

            println!("\n=== Exposure ===");
            println!("Max open per strategy: {}", config.exposure.max_open_per_strategy);
            println!("Max open global:       {}", config.exposure.max_open_global);

            println!("\n=== Dispatch ===");
            println!("Poll interval:         {}ms", config.dispatch.poll_interval_ms);
            println!("Max attempts:          {}", config.dispatch.max_attempts);
            println!("Initial backoff:       {}ms", config.dispatch.initial_backoff_ms);
            println!("Max backoff:           {}ms", config.dispatch.max_backoff_ms);
            println!("Dedup cache size:      {}", config.dispatch.dedup_cache_size);

            println!("\n=== Gateway ===");
            println!("Kind:                  {}", config.gateway.kind);
            if let Some(url) = &config.gateway.url {
                println!("URL:                   {url}");
            }

            println!("\n=== Runner ===");
            println!("Strategy timeout:      {}s", config.runner.strategy_timeout_secs);
        }
    }

    Ok(())
}
