//! MACD (Moving Average Convergence Divergence)
//!
//! MACD line = EMA(fast) - EMA(slow), signal line = EMA(MACD line, signal).
//! The line is available from index `slow - 1`, the signal line from
//! `slow + signal - 2`.

use super::moving_average::{ema_of, ema_series};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

/// MACD line and signal line, both aligned with the input closes
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
}

impl MacdSeries {
    /// MACD minus signal at `index`, when both are available
    pub fn histogram(&self, index: usize) -> Option<f64> {
        match (self.macd.get(index)?, self.signal.get(index)?) {
            (Some(m), Some(s)) => Some(m - s),
            _ => None,
        }
    }
}

pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);

    let macd: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();

    let signal = ema_of(&macd, signal);

    MacdSeries { macd, signal }
}
