// Trading strategy module
pub mod dema_macd;
pub mod signals;

pub use dema_macd::DemaMacdStrategy;
pub use signals::{evaluate_at, evaluate_signal, validate_candle_order, SignalConfig};

use crate::models::{Candle, Position, Signal};
use crate::Result;

/// Base trait for all trading strategies
///
/// Strategies are stateless: every call sees the full candle window and the
/// symbol's current position, if any.
pub trait Strategy: Send + Sync {
    /// Generate a trading signal from the candle window
    fn generate_signal(&self, candles: &[Candle], position: Option<&Position>) -> Result<Signal>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum usable candles before the strategy is evaluated at all
    fn min_candles_required(&self) -> usize;
}
