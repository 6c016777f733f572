use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::macd::{calculate_macd, DEFAULT_FAST, DEFAULT_SIGNAL, DEFAULT_SLOW};
use super::moving_average::dema_series;
use super::supertrend::{calculate_supertrend, DEFAULT_MULTIPLIER, DEFAULT_PERIOD};
use crate::models::{Candle, TrendDirection};

/// Indicator parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndicatorConfig {
    pub dema_length: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub supertrend_length: usize,
    pub supertrend_multiplier: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            dema_length: 200,
            macd_fast: DEFAULT_FAST,
            macd_slow: DEFAULT_SLOW,
            macd_signal: DEFAULT_SIGNAL,
            supertrend_length: DEFAULT_PERIOD,
            supertrend_multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl IndicatorConfig {
    /// Candles needed before every indicator has a value
    pub fn full_warmup(&self) -> usize {
        let dema = (2 * self.dema_length).saturating_sub(1);
        let macd = (self.macd_slow + self.macd_signal).saturating_sub(1);
        let supertrend = self.supertrend_length + 1;
        dema.max(macd).max(supertrend)
    }
}

/// Indicator values for one candle
///
/// Fields are `None` while the corresponding indicator is warming up.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorFrame {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub dema: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub supertrend: Option<f64>,
    pub direction: Option<TrendDirection>,
}

/// Compute the full indicator frame series for a candle window
///
/// Pure function of its input: the whole window is recomputed on every call.
/// The result has exactly one frame per candle.
pub fn compute_frames(candles: &[Candle], config: &IndicatorConfig) -> Vec<IndicatorFrame> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let dema = dema_series(&closes, config.dema_length);
    let macd = calculate_macd(
        &closes,
        config.macd_fast,
        config.macd_slow,
        config.macd_signal,
    );
    let supertrend = calculate_supertrend(
        candles,
        config.supertrend_length,
        config.supertrend_multiplier,
    );

    candles
        .iter()
        .enumerate()
        .map(|(i, candle)| IndicatorFrame {
            timestamp: candle.timestamp,
            close: candle.close,
            dema: dema[i],
            macd: macd.macd[i],
            macd_signal: macd.signal[i],
            supertrend: supertrend[i].map(|p| p.value),
            direction: supertrend[i].map(|p| p.direction),
        })
        .collect()
}
