//! Ledger inspection
//!
//! Prints the open positions recorded in the configured ledger store,
//! without touching the exchange. The store is opened read-only: no files
//! are created and no database migrations run.
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use trendbot::config::{LedgerSection, TradingMode};
use trendbot::persistence::open_store_readonly;

#[derive(Parser, Debug)]
#[command(name = "trendbot-ledger", about = "Show open positions from the trendbot ledger")]
struct Args {
    /// JSON ledger file (defaults to the per-mode file)
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Read the live ledger instead of the paper one
    #[arg(long)]
    live: bool,

    /// Postgres URL; takes precedence over --path
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Print the raw JSON snapshot instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
        .init();

    let args = Args::parse();
    let section = LedgerSection {
        path: args.path,
        database_url: args.database_url,
    };

    let mode = if args.live { TradingMode::Live } else { TradingMode::Paper };

    let store = open_store_readonly(&section, mode)
        .await
        .context("Failed to open ledger store")?;
    let positions = store.load().await.context("Failed to read ledger")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&positions)?);
        return Ok(());
    }

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║                 TRENDBOT OPEN POSITIONS               ║");
    println!("╚═══════════════════════════════════════════════════════╝");
    println!("Store: {}\n", store.describe());

    if positions.is_empty() {
        println!("No open positions (all symbols flat)");
        return Ok(());
    }

    println!(
        "{:<14} {:>16} {:>14} {:<26} {}",
        "SYMBOL", "ENTRY", "QUANTITY", "ENTERED", "ORDER"
    );
    for position in positions.values() {
        println!(
            "{:<14} {:>16.4} {:>14.6} {:<26} {}",
            position.symbol,
            position.entry_price,
            position.quantity,
            position.entry_time.format("%Y-%m-%d %H:%M:%S UTC"),
            position.order_id
        );
    }
    println!("\n{} open positions", positions.len());

    Ok(())
}
