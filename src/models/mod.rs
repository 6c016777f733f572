use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OHLCV candlestick for one interval of one symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// All price and volume fields are finite numbers
    pub fn is_usable(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Direction reported by the Supertrend indicator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrendDirection {
    Up,
    Down,
}

/// Why a signal fired
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SignalReason {
    /// Bullish MACD crossover with close above DEMA
    DemaMacdCross,
    /// Close crossed below the Supertrend line
    SupertrendFlip,
    StopLoss,
    TargetHit,
}

/// Trading signal for one symbol on one tick
///
/// `Hold` is the "no action" signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Hold,
    Enter(SignalReason),
    Exit(SignalReason),
}

impl Signal {
    pub fn is_hold(&self) -> bool {
        matches!(self, Signal::Hold)
    }

    pub fn reason(&self) -> Option<SignalReason> {
        match self {
            Signal::Hold => None,
            Signal::Enter(reason) | Signal::Exit(reason) => Some(*reason),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Hold => write!(f, "HOLD"),
            Signal::Enter(reason) => write!(f, "ENTER ({:?})", reason),
            Signal::Exit(reason) => write!(f, "EXIT ({:?})", reason),
        }
    }
}

/// Open position in a symbol
///
/// A record exists only while the symbol is not flat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
    pub order_id: String,
}

impl Position {
    /// Unrealized P&L at `current_price`
    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) * self.quantity
    }

    /// Unrealized P&L as a fraction of entry price
    pub fn unrealized_pnl_pct(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) / self.entry_price
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
