use super::{signals::evaluate_signal, SignalConfig, Strategy};
use crate::error::BotError;
use crate::indicators::{compute_frames, IndicatorConfig};
use crate::models::{Candle, Position, Signal};
use crate::Result;

/// Trend-following strategy on DEMA, MACD and Supertrend
///
/// - Enter on a bullish MACD crossover while the close is above DEMA(200)
/// - Exit when the close crosses below Supertrend, or at the stop/target
#[derive(Debug, Clone)]
pub struct DemaMacdStrategy {
    indicators: IndicatorConfig,
    signals: SignalConfig,
    min_candles: usize,
}

impl DemaMacdStrategy {
    pub fn new(indicators: IndicatorConfig, signals: SignalConfig) -> Self {
        Self {
            indicators,
            signals,
            min_candles: 200,
        }
    }

    pub fn with_min_candles(mut self, min_candles: usize) -> Self {
        self.min_candles = min_candles.max(2);
        self
    }

    pub fn indicators(&self) -> &IndicatorConfig {
        &self.indicators
    }

    pub fn signals(&self) -> &SignalConfig {
        &self.signals
    }
}

impl Default for DemaMacdStrategy {
    fn default() -> Self {
        Self::new(IndicatorConfig::default(), SignalConfig::default())
    }
}

impl Strategy for DemaMacdStrategy {
    fn generate_signal(&self, candles: &[Candle], position: Option<&Position>) -> Result<Signal> {
        if candles.len() < self.min_candles_required() {
            return Err(BotError::InsufficientHistory {
                symbol: position.map(|p| p.symbol.clone()).unwrap_or_default(),
                available: candles.len(),
                required: self.min_candles_required(),
            });
        }

        let frames = compute_frames(candles, &self.indicators);
        let latest = &frames[frames.len() - 1];
        let previous = &frames[frames.len() - 2];

        tracing::debug!(
            close = latest.close,
            dema = ?latest.dema,
            macd = ?latest.macd,
            macd_signal = ?latest.macd_signal,
            supertrend = ?latest.supertrend,
            direction = ?latest.direction,
            "Indicators"
        );

        Ok(evaluate_signal(previous, latest, position, &self.signals))
    }

    fn name(&self) -> &str {
        "DemaMacdStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.min_candles
    }
}
