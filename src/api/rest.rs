use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::{HistoryFetcher, RequestSigner};
use crate::error::BotError;
use crate::execution::{ExecutionGateway, OpenOrder, OrderFilter, OrderRequest};
use crate::models::{Candle, OrderSide};
use crate::Result;

const CANDLES_PATH: &str = "/trade/api/v2/candles";
const ORDER_PATH: &str = "/trade/api/v2/order";
const ORDERS_PATH: &str = "/trade/api/v2/orders";
const DEFAULT_OPEN_ORDER_COUNT: usize = 100;
/// Upper bound on the sleep between history fetch attempts
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

type ExchangeRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Clone)]
pub struct RestClientConfig {
    pub base_url: String,
    pub exchange: String,
    pub api_key: String,
    pub requests_per_second: u32,
    /// Extra attempts for history fetches. Orders are never retried.
    pub fetch_retries: u32,
    pub retry_backoff: Duration,
    pub request_timeout: Duration,
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://coinswitch.co".to_string(),
            exchange: "coinswitchx".to_string(),
            api_key: String::new(),
            requests_per_second: 5,
            fetch_retries: 2,
            retry_backoff: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Client for the exchange REST API
///
/// Serves both as the history fetcher and, in live mode, the execution
/// gateway. All clones share one rate limiter.
#[derive(Clone)]
pub struct RestExchangeClient {
    client: Client,
    config: RestClientConfig,
    signer: Option<Arc<dyn RequestSigner>>,
    rate_limiter: Arc<ExchangeRateLimiter>,
}

/// Numeric field that may arrive as a JSON number or a string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Num {
    Number(f64),
    Text(String),
}

impl Num {
    fn value(&self) -> f64 {
        match self {
            Num::Number(v) => *v,
            Num::Text(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }
}

fn num(field: &Option<Num>) -> f64 {
    field.as_ref().map_or(f64::NAN, Num::value)
}

#[derive(Debug, Deserialize)]
struct CandleResponse {
    #[serde(default)]
    data: Option<Vec<RawCandle>>,
}

#[derive(Debug, Deserialize)]
struct RawCandle {
    #[serde(default)]
    o: Option<Num>,
    #[serde(default)]
    h: Option<Num>,
    #[serde(default)]
    l: Option<Num>,
    #[serde(default)]
    c: Option<Num>,
    #[serde(default)]
    volume: Option<Num>,
    #[serde(default)]
    close_time: Option<Num>,
}

impl RawCandle {
    fn into_candle(self) -> Option<Candle> {
        let close_time = num(&self.close_time);
        if !close_time.is_finite() {
            return None;
        }
        let timestamp = Utc.timestamp_millis_opt(close_time as i64).single()?;

        let candle = Candle {
            timestamp,
            open: num(&self.o),
            high: num(&self.h),
            low: num(&self.l),
            close: num(&self.c),
            volume: num(&self.volume),
        };
        candle.is_usable().then_some(candle)
    }
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    order_id: String,
    symbol: String,
    side: String,
    #[serde(default)]
    orig_qty: Option<Num>,
    #[serde(default)]
    price: Option<Num>,
}

impl RawOrder {
    fn into_open_order(self) -> Option<OpenOrder> {
        let side = match self.side.to_ascii_lowercase().as_str() {
            "buy" => OrderSide::Buy,
            "sell" => OrderSide::Sell,
            _ => return None,
        };
        let price = num(&self.price);
        Some(OpenOrder {
            order_id: self.order_id,
            symbol: self.symbol,
            side,
            quantity: num(&self.orig_qty),
            price: price.is_finite().then_some(price),
        })
    }
}

/// Drop unusable rows, then sort and de-duplicate by timestamp
fn sanitize_candles(raw: Vec<RawCandle>) -> Vec<Candle> {
    let mut candles: Vec<Candle> = raw.into_iter().filter_map(RawCandle::into_candle).collect();
    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);
    candles
}

/// Pull the order id out of an order placement response
fn extract_order_id(data: &Value) -> Option<String> {
    let id = match data {
        Value::String(id) => id.clone(),
        Value::Object(fields) => match fields.get("order_id")? {
            Value::String(id) => id.clone(),
            Value::Number(id) => id.to_string(),
            _ => return None,
        },
        _ => return None,
    };
    let id = id.trim().to_string();
    (!id.is_empty()).then_some(id)
}

fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_string(),
    }
}

impl RestExchangeClient {
    pub fn new(config: RestClientConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            config,
            signer: None,
            rate_limiter,
        })
    }

    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    /// Send one rate-limited request and return its status and body
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<(StatusCode, String)> {
        self.rate_limiter.until_ready().await;

        let epoch = Utc::now().timestamp_millis().to_string();
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("X-AUTH-APIKEY", &self.config.api_key)
            .header("X-AUTH-EPOCH", &epoch);

        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        if let Some(signer) = &self.signer {
            let mut message = format!("{}{}", method.as_str(), path);
            if method == Method::GET && !query.is_empty() {
                let query_string: Vec<String> =
                    query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                message.push('?');
                message.push_str(&query_string.join("&"));
            }
            message.push_str(&epoch);
            request = request.header("X-AUTH-SIGNATURE", signer.sign(&message));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    async fn fetch_once(
        &self,
        symbol: &str,
        interval_minutes: u32,
        lookback: chrono::Duration,
    ) -> Result<Vec<Candle>> {
        let end = Utc::now();
        let start = end - lookback;
        let query = [
            ("exchange", self.config.exchange.clone()),
            ("symbol", symbol.to_uppercase()),
            ("interval", interval_minutes.to_string()),
            ("start_time", start.timestamp_millis().to_string()),
            ("end_time", end.timestamp_millis().to_string()),
        ];

        let (status, body) = self.send(Method::GET, CANDLES_PATH, &query, None).await?;
        if !status.is_success() {
            return Err(BotError::TransientFetch {
                symbol: symbol.to_string(),
                reason: format!("HTTP {}: {}", status, snippet(&body)),
            });
        }

        let response: CandleResponse = serde_json::from_str(&body)?;
        let raw = response.data.unwrap_or_default();
        let received = raw.len();
        let candles = sanitize_candles(raw);

        if candles.len() < received {
            tracing::debug!(
                "Dropped {} unusable candles for {}",
                received - candles.len(),
                symbol
            );
        }

        Ok(candles)
    }
}

/// Exponential backoff after failed attempt `attempt` (1-based), capped
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_RETRY_BACKOFF)
}

#[async_trait]
impl HistoryFetcher for RestExchangeClient {
    /// Fetch with exponential backoff between attempts
    async fn fetch(
        &self,
        symbol: &str,
        interval_minutes: u32,
        lookback: chrono::Duration,
    ) -> Result<Vec<Candle>> {
        let attempts = self.config.fetch_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.fetch_once(symbol, interval_minutes, lookback).await {
                Ok(candles) => {
                    if attempt > 1 {
                        tracing::info!("✓ Fetched {} after {} attempts", symbol, attempt);
                    }
                    return Ok(candles);
                }
                Err(e) => {
                    if attempt < attempts {
                        let backoff = retry_delay(self.config.retry_backoff, attempt);
                        tracing::warn!(
                            "Attempt {}/{} failed for {}: {}. Retrying in {:?}...",
                            attempt,
                            attempts,
                            symbol,
                            e,
                            backoff
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(BotError::TransientFetch { symbol, reason }) => {
                BotError::TransientFetch { symbol, reason }
            }
            Some(e) => BotError::TransientFetch {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            },
            None => BotError::TransientFetch {
                symbol: symbol.to_string(),
                reason: "no attempts made".to_string(),
            },
        })
    }
}

#[async_trait]
impl ExecutionGateway for RestExchangeClient {
    async fn place_order(&self, order: &OrderRequest) -> Result<String> {
        let mut body = json!({
            "side": order.side.as_str(),
            "symbol": order.symbol.to_lowercase(),
            "type": order.order_type().as_str(),
            "quantity": order.quantity,
            "exchange": self.config.exchange,
        });
        if let Some(price) = order.price {
            body["price"] = json!(price);
        }

        let rejected = |reason: String| BotError::OrderRejected {
            symbol: order.symbol.clone(),
            reason,
        };

        let (status, text) = self.send(Method::POST, ORDER_PATH, &[], Some(&body)).await?;
        if !status.is_success() {
            return Err(rejected(format!("HTTP {}: {}", status, snippet(&text))));
        }

        let response: Value = serde_json::from_str(&text)
            .map_err(|e| rejected(format!("unreadable response: {}", e)))?;

        match response.get("data").and_then(extract_order_id) {
            Some(order_id) => {
                tracing::info!(
                    "✅ Placed {} {} {} -> order {}",
                    order.side,
                    order.quantity,
                    order.symbol,
                    order_id
                );
                Ok(order_id)
            }
            None => Err(rejected(format!("no order id in response: {}", snippet(&text)))),
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let body = json!({ "order_id": order_id });
        let (status, text) = self.send(Method::DELETE, ORDER_PATH, &[], Some(&body)).await?;

        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string));
        let confirmed = message
            .as_deref()
            .map_or(true, |m| m.to_ascii_lowercase().contains("cancel"));

        if status.is_success() && confirmed {
            Ok(())
        } else {
            Err(BotError::OrderRejected {
                symbol: String::new(),
                reason: format!(
                    "cancel {} failed: HTTP {}: {}",
                    order_id,
                    status,
                    snippet(&text)
                ),
            })
        }
    }

    async fn list_open_orders(&self, filter: &OrderFilter) -> Result<Vec<OpenOrder>> {
        let mut query = vec![
            (
                "count",
                filter.limit.unwrap_or(DEFAULT_OPEN_ORDER_COUNT).to_string(),
            ),
            ("open", "true".to_string()),
        ];
        if let Some(side) = filter.side {
            query.push(("side", side.as_str().to_string()));
        }
        if !filter.symbols.is_empty() {
            query.push(("symbols", filter.symbols.join(",")));
        }

        let (status, text) = self.send(Method::GET, ORDERS_PATH, &query, None).await?;
        if !status.is_success() {
            return Err(BotError::TransientFetch {
                symbol: filter.symbols.join(","),
                reason: format!("open orders: HTTP {}: {}", status, snippet(&text)),
            });
        }

        let response: Value = serde_json::from_str(&text)?;
        let orders = match response.get("data") {
            Some(Value::Array(orders)) => orders.clone(),
            Some(Value::Object(data)) => match data.get("orders") {
                Some(Value::Array(orders)) => orders.clone(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        let orders = orders
            .into_iter()
            .filter_map(|v| serde_json::from_value::<RawOrder>(v).ok())
            .filter_map(RawOrder::into_open_order)
            .filter(|o| filter.matches(o))
            .collect();
        Ok(orders)
    }

    fn name(&self) -> &str {
        "rest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::OrderType;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard) -> RestExchangeClient {
        RestExchangeClient::new(RestClientConfig {
            base_url: server.url(),
            api_key: "test-key".to_string(),
            requests_per_second: 100,
            fetch_retries: 1,
            retry_backoff: Duration::from_millis(1),
            ..Default::default()
        })
        .unwrap()
    }

    struct EchoSigner;

    impl RequestSigner for EchoSigner {
        fn sign(&self, message: &str) -> String {
            message.to_string()
        }
    }

    #[tokio::test]
    async fn test_fetch_parses_and_sanitizes_candles() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "data": [
                {"o": "101", "h": "103", "l": "100", "c": "102", "volume": "5.5", "close_time": 1719792600000_i64},
                {"o": 100.0, "h": 102.0, "l": 99.0, "c": 101.0, "volume": 4.0, "close_time": "1719792300000"},
                {"o": "bad", "h": "1", "l": "1", "c": "1", "volume": "1", "close_time": 1719792900000_i64},
                {"o": "101", "h": "103", "l": "100", "c": "102", "volume": "5.5", "close_time": 1719792600000_i64}
            ]
        });
        let mock = server
            .mock("GET", "/trade/api/v2/candles")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "BTC/INR".into()),
                Matcher::UrlEncoded("interval".into(), "5".into()),
                Matcher::UrlEncoded("exchange".into(), "coinswitchx".into()),
            ]))
            .match_header("x-auth-apikey", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let candles = client
            .fetch("btc/inr", 5, chrono::Duration::days(2))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candles.len(), 2);
        assert!(candles[0].timestamp < candles[1].timestamp);
        assert_eq!(candles[0].close, 101.0);
        assert_eq!(candles[1].close, 102.0);
        assert_eq!(candles[1].volume, 5.5);
    }

    #[tokio::test]
    async fn test_fetch_empty_data_is_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/trade/api/v2/candles")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data": []}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let candles = client
            .fetch("ETH/INR", 5, chrono::Duration::days(1))
            .await
            .unwrap();
        assert!(candles.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_retries_then_reports_transient_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/trade/api/v2/candles")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("maintenance")
            .expect(2)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .fetch("BTC/INR", 5, chrono::Duration::days(1))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, BotError::TransientFetch { .. }));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_many_retries_end_in_transient_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/trade/api/v2/candles")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(41)
            .create_async()
            .await;

        let client = RestExchangeClient::new(RestClientConfig {
            base_url: server.url(),
            requests_per_second: 1000,
            fetch_retries: 40,
            retry_backoff: Duration::ZERO,
            ..Default::default()
        })
        .unwrap();
        let err = client
            .fetch("BTC/INR", 5, chrono::Duration::days(1))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, BotError::TransientFetch { .. }));
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(base, 1), Duration::from_millis(500));
        assert_eq!(retry_delay(base, 3), Duration::from_millis(2000));
        assert_eq!(retry_delay(base, 40), MAX_RETRY_BACKOFF);
        assert_eq!(retry_delay(base, u32::MAX), MAX_RETRY_BACKOFF);
        assert_eq!(retry_delay(Duration::ZERO, 64), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_place_limit_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/trade/api/v2/order")
            .match_header("x-auth-apikey", "test-key")
            .match_body(Matcher::PartialJson(json!({
                "side": "buy",
                "symbol": "btc/inr",
                "type": "limit",
                "quantity": 0.001,
                "price": 5000000.0,
                "exchange": "coinswitchx"
            })))
            .with_status(200)
            .with_body(r#"{"data": {"order_id": "abc-123", "status": "OPEN"}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let order = OrderRequest::new("BTC/INR", OrderSide::Buy, 0.001, OrderType::Limit, 5_000_000.0);
        let order_id = client.place_order(&order).await.unwrap();

        mock.assert_async().await;
        assert_eq!(order_id, "abc-123");
    }

    #[tokio::test]
    async fn test_rejected_order_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/trade/api/v2/order")
            .with_status(400)
            .with_body(r#"{"message": "Insufficient balance"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let order = OrderRequest::new("BTC/INR", OrderSide::Buy, 0.001, OrderType::Market, 1.0);
        let err = client.place_order(&order).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, BotError::OrderRejected { .. }));
        assert!(err.to_string().contains("Insufficient balance"));
    }

    #[tokio::test]
    async fn test_missing_order_id_is_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/trade/api/v2/order")
            .with_status(200)
            .with_body(r#"{"data": {"order_id": ""}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let order = OrderRequest::new("BTC/INR", OrderSide::Sell, 0.001, OrderType::Market, 1.0);
        let err = client.place_order(&order).await.unwrap_err();
        assert!(matches!(err, BotError::OrderRejected { .. }));
    }

    #[tokio::test]
    async fn test_list_and_cancel_open_orders() {
        let mut server = mockito::Server::new_async().await;
        let list = server
            .mock("GET", "/trade/api/v2/orders")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("open".into(), "true".into()),
                Matcher::UrlEncoded("symbols".into(), "BTC/INR".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "data": {
                        "orders": [
                            {"order_id": "o-1", "symbol": "BTC/INR", "side": "BUY", "orig_qty": "0.002", "price": "4900000"},
                            {"order_id": "o-2", "symbol": "BTC/INR", "side": "sell", "orig_qty": 0.001}
                        ]
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;
        let cancel = server
            .mock("DELETE", "/trade/api/v2/order")
            .match_body(Matcher::Json(json!({"order_id": "o-1"})))
            .with_status(200)
            .with_body(r#"{"message": "Order cancelled successfully"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let orders = client
            .list_open_orders(&OrderFilter::for_symbol("BTC/INR"))
            .await
            .unwrap();

        list.assert_async().await;
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].side, OrderSide::Buy);
        assert_eq!(orders[0].quantity, 0.002);
        assert_eq!(orders[0].price, Some(4_900_000.0));
        assert_eq!(orders[1].price, None);

        client.cancel_order("o-1").await.unwrap();
        cancel.assert_async().await;
    }

    #[tokio::test]
    async fn test_signer_covers_method_path_and_epoch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/trade/api/v2/order")
            .match_header(
                "x-auth-signature",
                Matcher::Regex(r"^POST/trade/api/v2/order\d+$".to_string()),
            )
            .match_header("x-auth-epoch", Matcher::Regex(r"^\d+$".to_string()))
            .with_status(200)
            .with_body(r#"{"data": "plain-id"}"#)
            .create_async()
            .await;

        let client = client_for(&server).with_signer(Arc::new(EchoSigner));
        let order = OrderRequest::new("ETH/INR", OrderSide::Buy, 1.0, OrderType::Market, 1.0);
        let order_id = client.place_order(&order).await.unwrap();

        mock.assert_async().await;
        assert_eq!(order_id, "plain-id");
    }

    #[test]
    fn test_extract_order_id_shapes() {
        assert_eq!(extract_order_id(&json!("x-1")), Some("x-1".to_string()));
        assert_eq!(
            extract_order_id(&json!({"order_id": 42})),
            Some("42".to_string())
        );
        assert_eq!(extract_order_id(&json!({"status": "OPEN"})), None);
        assert_eq!(extract_order_id(&json!("   ")), None);
        assert_eq!(extract_order_id(&Value::Null), None);
    }
}
