use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use trendbot::api::{HistoryFetcher, RestExchangeClient};
use trendbot::config::{BotConfig, TradingMode};
use trendbot::execution::{ExecutionGateway, Executor, PaperGateway, PositionLedger};
use trendbot::persistence::open_store;
use trendbot::scheduler::{Pipeline, PipelineConfig, Scheduler};
use trendbot::strategy::DemaMacdStrategy;

#[derive(Parser, Debug)]
#[command(name = "trendbot", about = "DEMA/MACD/Supertrend trend-following bot")]
struct Args {
    /// TOML config file (defaults to ./trendbot.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single tick and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();

    tracing::info!("🚀 TrendBot starting");

    let config = BotConfig::load(args.config.as_deref()).context("Invalid configuration")?;
    config.log_summary();

    let store = open_store(&config.ledger, config.bot.mode)
        .await
        .context("Failed to open ledger store")?;
    let ledger = Arc::new(
        PositionLedger::load(store)
            .await
            .context("Failed to load ledger")?,
    );

    let rest = Arc::new(
        RestExchangeClient::new((&config.exchange).into()).context("Failed to build HTTP client")?,
    );
    let gateway: Arc<dyn ExecutionGateway> = match config.bot.mode {
        TradingMode::Paper => {
            tracing::info!("📝 Paper trading: orders are simulated");
            Arc::new(PaperGateway::new())
        }
        TradingMode::Live => {
            if !rest.has_signer() {
                tracing::warn!("No request signer installed, live orders carry only the API key");
            }
            rest.clone()
        }
    };
    let fetcher: Arc<dyn HistoryFetcher> = rest;

    let strategy = DemaMacdStrategy::new(config.indicators.clone(), config.risk.clone())
        .with_min_candles(config.bot.min_candles);
    let warmup = config.indicators.full_warmup();
    tracing::info!(
        "Entries need {} candles of history; {} days of {}m candles requested",
        warmup,
        config.bot.history_days,
        config.bot.candle_interval_minutes
    );

    let executor = Arc::new(Executor::new(
        gateway,
        ledger.clone(),
        config.quantities(),
        (&config.orders).into(),
    ));
    let pipeline = Arc::new(Pipeline::new(
        fetcher,
        Arc::new(strategy),
        ledger.clone(),
        executor,
        PipelineConfig {
            candle_interval_minutes: config.bot.candle_interval_minutes,
            lookback: config.lookback(),
        },
    ));
    let scheduler = Scheduler::new(
        pipeline,
        config.symbol_names(),
        config.tick_interval(),
        config.bot.fan_out,
    );

    if args.once {
        let report = scheduler.run_tick().await;
        tracing::info!("Single tick finished with {} failures", report.failures());
    } else {
        tracing::info!("Press Ctrl+C to stop...");
        scheduler
            .run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
                tracing::info!("⚠️  Received Ctrl+C, shutting down...");
            })
            .await;
    }

    for position in ledger.snapshot().await.values() {
        tracing::info!(
            "Open: {} x {} @ {} since {}",
            position.symbol,
            position.quantity,
            position.entry_price,
            position.entry_time
        );
    }
    tracing::info!("👋 TrendBot stopped");

    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trendbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
