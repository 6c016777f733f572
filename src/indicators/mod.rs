// Technical indicators module
// DEMA, MACD, ATR and Supertrend series aligned 1:1 with candles

pub mod atr;
pub mod frame;
pub mod macd;
pub mod moving_average;
pub mod supertrend;

pub use atr::{atr_series, true_range_series};
pub use frame::{compute_frames, IndicatorConfig, IndicatorFrame};
pub use macd::{calculate_macd, MacdSeries};
pub use moving_average::{dema_series, ema_of, ema_series};
pub use supertrend::{calculate_supertrend, SupertrendPoint};
