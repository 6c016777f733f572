use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::BotError;
use crate::models::Position;
use crate::persistence::LedgerStore;
use crate::Result;

/// Open positions, one per symbol, backed by a durable store
///
/// A symbol is either absent (flat) or mapped to its open position. Every
/// mutation is written through to the store while the lock is held, so
/// concurrent passes for different symbols never lose each other's updates.
pub struct PositionLedger {
    positions: Mutex<BTreeMap<String, Position>>,
    store: Arc<dyn LedgerStore>,
}

impl PositionLedger {
    /// Load the persisted ledger. Called once at startup.
    pub async fn load(store: Arc<dyn LedgerStore>) -> Result<Self> {
        let positions = store.load().await?;

        for (symbol, position) in &positions {
            if symbol != &position.symbol {
                return Err(BotError::InvalidPosition(format!(
                    "ledger key {} holds a position for {}",
                    symbol, position.symbol
                )));
            }
            validate(position)?;
        }

        tracing::info!(
            "Loaded {} open positions from {}",
            positions.len(),
            store.describe()
        );

        Ok(Self {
            positions: Mutex::new(positions),
            store,
        })
    }

    pub async fn get(&self, symbol: &str) -> Option<Position> {
        self.positions.lock().await.get(symbol).cloned()
    }

    pub async fn is_open(&self, symbol: &str) -> bool {
        self.positions.lock().await.contains_key(symbol)
    }

    pub async fn snapshot(&self) -> BTreeMap<String, Position> {
        self.positions.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.positions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.positions.lock().await.is_empty()
    }

    /// Flat -> Open, after the gateway acknowledged the entry order
    ///
    /// If the durable write fails the position stays open in memory, since
    /// the order was executed, and `Persistence` is returned.
    pub async fn open_position(&self, position: Position) -> Result<()> {
        validate(&position)?;

        let mut positions = self.positions.lock().await;
        if positions.contains_key(&position.symbol) {
            return Err(BotError::PositionExists(position.symbol));
        }

        let symbol = position.symbol.clone();
        tracing::info!(
            "📈 Opened {} x {} @ {} (order {})",
            symbol,
            position.quantity,
            position.entry_price,
            position.order_id
        );
        positions.insert(symbol.clone(), position);

        self.persist(&positions, &symbol).await
    }

    /// Open -> Flat, after the gateway acknowledged the exit order
    pub async fn close_position(&self, symbol: &str) -> Result<Position> {
        let mut positions = self.positions.lock().await;
        let position = positions
            .remove(symbol)
            .ok_or_else(|| BotError::NoPosition(symbol.to_string()))?;

        tracing::info!(
            "📉 Closed {} x {} (entered @ {}, order {})",
            symbol,
            position.quantity,
            position.entry_price,
            position.order_id
        );

        self.persist(&positions, symbol).await?;
        Ok(position)
    }

    async fn persist(&self, positions: &BTreeMap<String, Position>, symbol: &str) -> Result<()> {
        self.store.save(positions).await.map_err(|e| {
            tracing::error!(
                "Failed to persist ledger to {} after {} transition: {}",
                self.store.describe(),
                symbol,
                e
            );
            BotError::Persistence(e.to_string())
        })
    }
}

fn validate(position: &Position) -> Result<()> {
    if position.symbol.trim().is_empty() {
        return Err(BotError::InvalidPosition("empty symbol".to_string()));
    }
    if !(position.quantity.is_finite() && position.quantity > 0.0) {
        return Err(BotError::InvalidPosition(format!(
            "{}: quantity must be positive, got {}",
            position.symbol, position.quantity
        )));
    }
    if !(position.entry_price.is_finite() && position.entry_price > 0.0) {
        return Err(BotError::InvalidPosition(format!(
            "{}: entry price must be positive, got {}",
            position.symbol, position.entry_price
        )));
    }
    if position.order_id.trim().is_empty() {
        return Err(BotError::InvalidPosition(format!(
            "{}: missing order id",
            position.symbol
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::JsonFileStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    fn position(symbol: &str, order_id: &str) -> Position {
        Position {
            symbol: symbol.to_string(),
            entry_price: 100.0,
            quantity: 2.0,
            entry_time: Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap(),
            order_id: order_id.to_string(),
        }
    }

    struct FailingStore;

    #[async_trait]
    impl LedgerStore for FailingStore {
        async fn load(&self) -> Result<BTreeMap<String, Position>> {
            Ok(BTreeMap::new())
        }

        async fn save(&self, _positions: &BTreeMap<String, Position>) -> Result<()> {
            Err(BotError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }

        fn describe(&self) -> String {
            "failing store".to_string()
        }
    }

    async fn json_ledger(dir: &tempfile::TempDir) -> PositionLedger {
        let store = Arc::new(JsonFileStore::new(dir.path().join("positions.json")));
        PositionLedger::load(store).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = json_ledger(&dir).await;

        ledger.open_position(position("BTC/INR", "ord-1")).await.unwrap();
        assert!(ledger.is_open("BTC/INR").await);
        assert!(!ledger.is_open("ETH/INR").await);

        let closed = ledger.close_position("BTC/INR").await.unwrap();
        assert_eq!(closed.order_id, "ord-1");
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_second_open_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = json_ledger(&dir).await;

        ledger.open_position(position("BTC/INR", "ord-1")).await.unwrap();
        let err = ledger
            .open_position(position("BTC/INR", "ord-2"))
            .await
            .unwrap_err();

        assert!(matches!(err, BotError::PositionExists(_)));
        assert_eq!(ledger.get("BTC/INR").await.unwrap().order_id, "ord-1");
    }

    #[tokio::test]
    async fn test_close_when_flat() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = json_ledger(&dir).await;

        let err = ledger.close_position("BTC/INR").await.unwrap_err();
        assert!(matches!(err, BotError::NoPosition(_)));
    }

    #[tokio::test]
    async fn test_invalid_positions_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = json_ledger(&dir).await;

        let mut zero_quantity = position("BTC/INR", "ord-1");
        zero_quantity.quantity = 0.0;
        assert!(ledger.open_position(zero_quantity).await.is_err());

        let missing_order = position("BTC/INR", "  ");
        assert!(ledger.open_position(missing_order).await.is_err());

        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_every_mutation_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");
        let ledger = PositionLedger::load(Arc::new(JsonFileStore::new(&path)))
            .await
            .unwrap();

        ledger.open_position(position("BTC/INR", "ord-1")).await.unwrap();
        ledger.open_position(position("ETH/INR", "ord-2")).await.unwrap();

        let reloaded = PositionLedger::load(Arc::new(JsonFileStore::new(&path)))
            .await
            .unwrap();
        assert_eq!(reloaded.snapshot().await, ledger.snapshot().await);

        ledger.close_position("BTC/INR").await.unwrap();
        let reloaded = PositionLedger::load(Arc::new(JsonFileStore::new(&path)))
            .await
            .unwrap();
        assert_eq!(reloaded.len().await, 1);
        assert!(reloaded.is_open("ETH/INR").await);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_memory_state() {
        let ledger = PositionLedger::load(Arc::new(FailingStore)).await.unwrap();

        let err = ledger
            .open_position(position("BTC/INR", "ord-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, BotError::Persistence(_)));
        // The order went through, so the symbol must not be entered again
        assert!(ledger.is_open("BTC/INR").await);
    }

    #[tokio::test]
    async fn test_concurrent_opens_are_all_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");
        let ledger = Arc::new(
            PositionLedger::load(Arc::new(JsonFileStore::new(&path)))
                .await
                .unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger
                        .open_position(position(&format!("SYM{}/INR", i), &format!("ord-{}", i)))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reloaded = PositionLedger::load(Arc::new(JsonFileStore::new(&path)))
            .await
            .unwrap();
        assert_eq!(reloaded.len().await, 8);
    }

    #[tokio::test]
    async fn test_load_rejects_mismatched_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");
        let mut positions = BTreeMap::new();
        positions.insert("ETH/INR".to_string(), position("BTC/INR", "ord-1"));
        std::fs::write(&path, serde_json::to_string(&positions).unwrap()).unwrap();

        let result = PositionLedger::load(Arc::new(JsonFileStore::new(&path))).await;
        assert!(matches!(result, Err(BotError::InvalidPosition(_))));
    }
}
