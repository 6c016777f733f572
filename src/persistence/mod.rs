// Durable storage for the position ledger
pub mod json_file;

pub use json_file::JsonFileStore;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{LedgerSection, TradingMode};
use crate::db::PostgresLedgerStore;
use crate::models::Position;
use crate::Result;

/// Durable mapping of symbol to open position
///
/// Stores persist full snapshots. The ledger serializes every call, so
/// implementations may assume a single writer.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load every persisted position. An empty store is not an error.
    async fn load(&self) -> Result<BTreeMap<String, Position>>;

    /// Replace the persisted state with `positions`
    async fn save(&self, positions: &BTreeMap<String, Position>) -> Result<()>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

/// Open the store selected by the ledger configuration
///
/// A database URL selects Postgres (migrated to the current schema),
/// otherwise the JSON file for `mode` is used.
pub async fn open_store(config: &LedgerSection, mode: TradingMode) -> Result<Arc<dyn LedgerStore>> {
    match database_url(config) {
        Some(url) => Ok(Arc::new(PostgresLedgerStore::new(url).await?)),
        None => Ok(Arc::new(JsonFileStore::new(config.json_path(mode)))),
    }
}

/// Open the configured store for reading only
///
/// Never creates or migrates anything. Postgres is connected lazily, so
/// connection errors surface on the first `load`.
pub async fn open_store_readonly(
    config: &LedgerSection,
    mode: TradingMode,
) -> Result<Arc<dyn LedgerStore>> {
    match database_url(config) {
        Some(url) => Ok(Arc::new(PostgresLedgerStore::connect(url)?)),
        None => Ok(Arc::new(JsonFileStore::new(config.json_path(mode)))),
    }
}

fn database_url(config: &LedgerSection) -> Option<&str> {
    config.database_url.as_deref().filter(|url| !url.trim().is_empty())
}
