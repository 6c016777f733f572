use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use super::gateway::{ExecutionGateway, OpenOrder, OrderFilter, OrderRequest};
use crate::error::BotError;
use crate::models::OrderSide;
use crate::Result;

/// A simulated execution
#[derive(Debug, Clone, PartialEq)]
pub struct PaperFill {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: Option<f64>,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct PaperBook {
    fills: Vec<PaperFill>,
    resting: Vec<OpenOrder>,
    reject_remaining: usize,
    reject_reason: String,
}

/// In-memory gateway for paper trading
///
/// Every accepted order gets a fresh UUID and fills immediately, limit
/// orders at their limit price. With [`PaperGateway::with_resting_limits`]
/// limit orders rest in the book until cancelled instead.
#[derive(Debug, Default)]
pub struct PaperGateway {
    book: Mutex<PaperBook>,
    rest_limits: bool,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep limit orders open until cancelled
    pub fn with_resting_limits() -> Self {
        Self {
            rest_limits: true,
            ..Self::default()
        }
    }

    /// Reject the next `count` placements with `reason`
    pub fn reject_next(&self, count: usize, reason: &str) {
        let mut book = self.lock();
        book.reject_remaining = count;
        book.reject_reason = reason.to_string();
    }

    pub fn fills(&self) -> Vec<PaperFill> {
        self.lock().fills.clone()
    }

    pub fn resting_orders(&self) -> Vec<OpenOrder> {
        self.lock().resting.clone()
    }

    /// Total placements accepted so far, filled or resting
    pub fn accepted_count(&self) -> usize {
        let book = self.lock();
        book.fills.len() + book.resting.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PaperBook> {
        // A panic while holding the lock cannot leave the book half-updated
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn place_order(&self, order: &OrderRequest) -> Result<String> {
        if !(order.quantity.is_finite() && order.quantity > 0.0) {
            return Err(BotError::OrderRejected {
                symbol: order.symbol.clone(),
                reason: format!("invalid quantity {}", order.quantity),
            });
        }

        let mut book = self.lock();
        if book.reject_remaining > 0 {
            book.reject_remaining -= 1;
            return Err(BotError::OrderRejected {
                symbol: order.symbol.clone(),
                reason: book.reject_reason.clone(),
            });
        }

        let order_id = Uuid::new_v4().to_string();
        match order.price {
            Some(price) if self.rest_limits => book.resting.push(OpenOrder {
                order_id: order_id.clone(),
                symbol: order.symbol.clone(),
                side: order.side,
                quantity: order.quantity,
                price: Some(price),
            }),
            price => book.fills.push(PaperFill {
                order_id: order_id.clone(),
                symbol: order.symbol.clone(),
                side: order.side,
                quantity: order.quantity,
                price,
                time: Utc::now(),
            }),
        }

        tracing::info!(
            "📝 Paper {} {} {} @ {} -> {}",
            order.side,
            order.quantity,
            order.symbol,
            order
                .price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "market".to_string()),
            order_id
        );

        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let mut book = self.lock();
        let Some(index) = book.resting.iter().position(|o| o.order_id == order_id) else {
            return Err(BotError::OrderRejected {
                symbol: String::new(),
                reason: format!("unknown order {}", order_id),
            });
        };
        let cancelled = book.resting.remove(index);
        tracing::info!("Paper cancel {} ({})", order_id, cancelled.symbol);
        Ok(())
    }

    async fn list_open_orders(&self, filter: &OrderFilter) -> Result<Vec<OpenOrder>> {
        let book = self.lock();
        let orders = book
            .resting
            .iter()
            .filter(|o| filter.matches(o))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(orders)
    }

    fn name(&self) -> &str {
        "paper"
    }
}
