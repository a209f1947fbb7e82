//! CLI entry point (§6, §10.6): `run` starts the live bot loop (and
//! optionally the dashboard), `backtest` replays historical candles through
//! the grid math without touching the control plane.
//!
//! Grounded on the teacher's `main.rs` (`dotenvy::dotenv().ok()` +
//! `env_logger::init()` + `#[tokio::main]`) and `bog-bins`' `clap::Parser`
//! derive CLI shape.

use clap::{Parser, Subcommand};
use gridbot::backtest::{load_csv, BacktestEngine};
use gridbot::config::BotConfig;
use gridbot::orchestrator::Orchestrator;

#[derive(Parser, Debug)]
#[command(name = "gridbot", author, version, about = "Automated multi-pair spot grid-trading bot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the bot against the configured exchange adapter.
    Run {
        #[arg(long, default_value = "config.yaml")]
        config: String,
        #[arg(long, default_value_t = true)]
        dashboard: bool,
        #[arg(long, conflicts_with = "dashboard")]
        no_dashboard: bool,
    },
    /// Replay historical OHLCV data through the grid math.
    Backtest {
        #[arg(long, default_value = "config.yaml")]
        config: String,
        #[arg(long)]
        data: String,
        #[arg(long, default_value_t = 10_000.0)]
        initial_balance: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { config, dashboard, no_dashboard } => {
            run(config, dashboard && !no_dashboard).await
        }
        Command::Backtest { config, data, initial_balance } => {
            backtest(config, data, initial_balance).await
        }
    };

    if let Err(e) = &result {
        log::error!("fatal error={e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(config_path: String, with_dashboard: bool) -> anyhow::Result<()> {
    let config = BotConfig::load(&config_path)?;
    let dashboard_config = config.dashboard.clone();
    let orchestrator = Orchestrator::start(config).await?;

    let dashboard_handle = with_dashboard.then(|| {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { gridbot::dashboard::serve(orchestrator, dashboard_config).await })
    });

    tokio::signal::ctrl_c().await?;
    log::info!("shutdown_signal_received");
    orchestrator.stop().await;

    if let Some(handle) = dashboard_handle {
        handle.abort();
    }
    Ok(())
}

async fn backtest(config_path: String, data_path: String, initial_balance: f64) -> anyhow::Result<()> {
    let config = BotConfig::load(&config_path)?;
    let grid_config = config
        .grids
        .first()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("config has no grid to backtest"))?;

    let candles = load_csv(&data_path)?;
    let engine = BacktestEngine::new(
        grid_config,
        config.paper_trading.simulated_fee_pct / 100.0,
        5.0,
        initial_balance,
        config.paper_trading.initial_balance_base,
    );
    let report = engine.run(&candles)?;
    let summary = report.summary();

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
