use chrono::{SubsecRound, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::gateway::{ExecutionGateway, OrderFilter, OrderRequest, OrderType};
use super::ledger::PositionLedger;
use crate::error::BotError;
use crate::models::{OrderSide, Position, Signal, SignalReason};
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Open { quantity: f64 },
    Close { position: Position, reason: SignalReason },
    Skip,
}

#[derive(Debug, Clone)]
pub struct ExecutionDecision {
    pub action: ExecutionAction,
    pub reason: String,
}

/// What the act step actually did
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Opened(Position),
    Closed {
        position: Position,
        exit_price: f64,
        reason: SignalReason,
    },
    Skipped(String),
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub order_type: OrderType,
    pub order_timeout: Duration,
    pub cancel_open_orders_before_entry: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            order_type: OrderType::Limit,
            order_timeout: Duration::from_secs(10),
            cancel_open_orders_before_entry: false,
        }
    }
}

/// Turns signals into orders and ledger transitions
///
/// The ledger is only touched after the gateway acknowledged an order with a
/// non-empty id. Any failure leaves it unchanged for the next tick.
pub struct Executor {
    gateway: Arc<dyn ExecutionGateway>,
    ledger: Arc<PositionLedger>,
    quantities: HashMap<String, f64>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(
        gateway: Arc<dyn ExecutionGateway>,
        ledger: Arc<PositionLedger>,
        quantities: HashMap<String, f64>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            gateway,
            ledger,
            quantities,
            config,
        }
    }

    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }

    /// Decide what to do with a signal given the ledger state
    pub async fn decide(&self, signal: &Signal, symbol: &str) -> ExecutionDecision {
        match signal {
            Signal::Enter(_) => {
                if self.ledger.is_open(symbol).await {
                    return ExecutionDecision {
                        action: ExecutionAction::Skip,
                        reason: "Already have open position".to_string(),
                    };
                }

                match self.quantities.get(symbol) {
                    Some(&quantity) => ExecutionDecision {
                        action: ExecutionAction::Open { quantity },
                        reason: format!("{} with {} configured", signal, quantity),
                    },
                    None => ExecutionDecision {
                        action: ExecutionAction::Skip,
                        reason: "No order quantity configured".to_string(),
                    },
                }
            }

            Signal::Exit(reason) => match self.ledger.get(symbol).await {
                Some(position) => ExecutionDecision {
                    action: ExecutionAction::Close {
                        position,
                        reason: *reason,
                    },
                    reason: signal.to_string(),
                },
                None => ExecutionDecision {
                    action: ExecutionAction::Skip,
                    reason: "No position to exit".to_string(),
                },
            },

            Signal::Hold => ExecutionDecision {
                action: ExecutionAction::Skip,
                reason: "Hold signal".to_string(),
            },
        }
    }

    /// Decide and act on a signal at the latest close
    pub async fn process_signal(
        &self,
        signal: &Signal,
        symbol: &str,
        latest_close: f64,
    ) -> Result<ExecutionOutcome> {
        let decision = self.decide(signal, symbol).await;

        match decision.action {
            ExecutionAction::Skip => {
                tracing::debug!("Skipping {}: {}", symbol, decision.reason);
                Ok(ExecutionOutcome::Skipped(decision.reason))
            }
            ExecutionAction::Open { quantity } => {
                let position = self.enter(symbol, quantity, latest_close).await?;
                Ok(ExecutionOutcome::Opened(position))
            }
            ExecutionAction::Close { position, reason } => {
                let position = self.exit(position, latest_close).await?;
                Ok(ExecutionOutcome::Closed {
                    position,
                    exit_price: latest_close,
                    reason,
                })
            }
        }
    }

    async fn enter(&self, symbol: &str, quantity: f64, price: f64) -> Result<Position> {
        if self.config.cancel_open_orders_before_entry {
            self.cancel_open_orders(symbol).await;
        }

        let order = OrderRequest::new(symbol, OrderSide::Buy, quantity, self.config.order_type, price);
        let order_id = self.place(&order).await?;

        let position = Position {
            symbol: symbol.to_string(),
            entry_price: price,
            quantity,
            // Microseconds survive every ledger backend unchanged
            entry_time: Utc::now().trunc_subsecs(6),
            order_id,
        };
        self.ledger.open_position(position.clone()).await?;

        Ok(position)
    }

    async fn exit(&self, position: Position, price: f64) -> Result<Position> {
        let order = OrderRequest::new(
            &position.symbol,
            OrderSide::Sell,
            position.quantity,
            self.config.order_type,
            price,
        );
        let order_id = self.place(&order).await?;

        tracing::info!(
            "Exit order {} for {} acknowledged, P&L {:+.2}%",
            order_id,
            position.symbol,
            position.unrealized_pnl_pct(price) * 100.0
        );

        self.ledger.close_position(&position.symbol).await
    }

    /// Place an order within the configured timeout
    async fn place(&self, order: &OrderRequest) -> Result<String> {
        let timeout = self.config.order_timeout;
        let order_id = match tokio::time::timeout(timeout, self.gateway.place_order(order)).await {
            Ok(Ok(order_id)) => order_id,
            Ok(Err(e)) => {
                tracing::error!("❌ {} order for {} failed: {}", order.side, order.symbol, e);
                return Err(e);
            }
            Err(_) => {
                tracing::error!(
                    "❌ {} order for {} timed out after {:?}",
                    order.side,
                    order.symbol,
                    timeout
                );
                return Err(BotError::GatewayTimeout {
                    symbol: order.symbol.clone(),
                    secs: timeout.as_secs(),
                });
            }
        };

        if order_id.trim().is_empty() {
            tracing::error!("❌ {} order for {} returned no order id", order.side, order.symbol);
            return Err(BotError::OrderRejected {
                symbol: order.symbol.clone(),
                reason: "empty order id".to_string(),
            });
        }

        Ok(order_id)
    }

    /// Best effort: failures are logged and the entry proceeds
    async fn cancel_open_orders(&self, symbol: &str) {
        let orders = match self
            .gateway
            .list_open_orders(&OrderFilter::for_symbol(symbol))
            .await
        {
            Ok(orders) => orders,
            Err(e) => {
                tracing::warn!("Could not list open orders for {}: {}", symbol, e);
                return;
            }
        };

        for order in orders {
            match self.gateway.cancel_order(&order.order_id).await {
                Ok(()) => tracing::info!("Cancelled stale order {} for {}", order.order_id, symbol),
                Err(e) => tracing::warn!("Failed to cancel order {}: {}", order.order_id, e),
            }
        }
    }
}
