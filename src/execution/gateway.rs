use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::OrderSide;
use crate::Result;

/// How entry and exit orders are priced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    /// Limit order at the latest close
    #[default]
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// `None` for market orders
    pub price: Option<f64>,
}

impl OrderRequest {
    pub fn new(symbol: &str, side: OrderSide, quantity: f64, order_type: OrderType, price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            quantity,
            price: match order_type {
                OrderType::Market => None,
                OrderType::Limit => Some(price),
            },
        }
    }

    pub fn order_type(&self) -> OrderType {
        if self.price.is_some() {
            OrderType::Limit
        } else {
            OrderType::Market
        }
    }
}

/// An order resting on the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: Option<f64>,
}

/// Filter for open order queries; empty fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub symbols: Vec<String>,
    pub side: Option<OrderSide>,
    pub limit: Option<usize>,
}

impl OrderFilter {
    pub fn for_symbol(symbol: &str) -> Self {
        Self {
            symbols: vec![symbol.to_string()],
            ..Default::default()
        }
    }

    pub fn matches(&self, order: &OpenOrder) -> bool {
        let symbol_ok = self.symbols.is_empty()
            || self
                .symbols
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&order.symbol));
        let side_ok = self.side.map_or(true, |side| side == order.side);
        symbol_ok && side_ok
    }
}

/// Order placement contract
///
/// Any error, including an empty order id, means nothing was executed.
/// Callers retry on the next tick without assuming partial fills.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Place an order and return the exchange order id
    async fn place_order(&self, order: &OrderRequest) -> Result<String>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    async fn list_open_orders(&self, filter: &OrderFilter) -> Result<Vec<OpenOrder>>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_order(symbol: &str, side: OrderSide) -> OpenOrder {
        OpenOrder {
            order_id: "o-1".to_string(),
            symbol: symbol.to_string(),
            side,
            quantity: 1.0,
            price: Some(10.0),
        }
    }

    #[test]
    fn test_limit_request_carries_price() {
        let order = OrderRequest::new("BTC/INR", OrderSide::Buy, 0.5, OrderType::Limit, 101.0);
        assert_eq!(order.price, Some(101.0));
        assert_eq!(order.order_type(), OrderType::Limit);

        let order = OrderRequest::new("BTC/INR", OrderSide::Buy, 0.5, OrderType::Market, 101.0);
        assert_eq!(order.price, None);
        assert_eq!(order.order_type(), OrderType::Market);
    }

    #[test]
    fn test_filter_matching() {
        let order = open_order("BTC/INR", OrderSide::Buy);

        assert!(OrderFilter::default().matches(&order));
        assert!(OrderFilter::for_symbol("btc/inr").matches(&order));
        assert!(!OrderFilter::for_symbol("ETH/INR").matches(&order));

        let sells = OrderFilter {
            side: Some(OrderSide::Sell),
            ..Default::default()
        };
        assert!(!sells.matches(&order));
    }
}
