pub mod rest;

pub use rest::{RestClientConfig, RestExchangeClient};

use async_trait::async_trait;

use crate::models::Candle;
use crate::Result;

/// Source of candle history
///
/// Returns candles ordered by timestamp. An empty or short series is not an
/// error; the pipeline treats it as a skip.
#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    async fn fetch(
        &self,
        symbol: &str,
        interval_minutes: u32,
        lookback: chrono::Duration,
    ) -> Result<Vec<Candle>>;
}

/// Produces the request signature header
///
/// Signing schemes are exchange specific and live outside this crate.
pub trait RequestSigner: Send + Sync {
    /// `message` is method, path, optional `?query` and epoch millis concatenated
    fn sign(&self, message: &str) -> String;
}
