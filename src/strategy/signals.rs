use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorFrame;
use crate::models::{Candle, Position, Signal, SignalReason};

/// Exit thresholds, as fractions of the entry price
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalConfig {
    pub stop_loss_pct: f64,
    pub target_pct: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.05,
            target_pct: 0.10,
        }
    }
}

impl SignalConfig {
    pub fn stop_price(&self, entry_price: f64) -> f64 {
        entry_price * (1.0 - self.stop_loss_pct)
    }

    pub fn target_price(&self, entry_price: f64) -> f64 {
        entry_price * (1.0 + self.target_pct)
    }
}

/// Decide what to do with a symbol given its last two indicator frames
///
/// Only entries are considered while flat and only exits while a position is
/// open, so `Enter` and `Exit` can never both apply.
pub fn evaluate_signal(
    previous: &IndicatorFrame,
    latest: &IndicatorFrame,
    position: Option<&Position>,
    config: &SignalConfig,
) -> Signal {
    match position {
        None => evaluate_entry(previous, latest),
        Some(position) => evaluate_exit(previous, latest, position, config),
    }
}

/// Evaluate the signal at `index` of a frame series
///
/// Index 0 has no previous frame and always holds.
pub fn evaluate_at(
    frames: &[IndicatorFrame],
    index: usize,
    position: Option<&Position>,
    config: &SignalConfig,
) -> Signal {
    if index == 0 || index >= frames.len() {
        return Signal::Hold;
    }
    evaluate_signal(&frames[index - 1], &frames[index], position, config)
}

/// Bullish MACD crossover while price trades above the DEMA trend filter
fn evaluate_entry(previous: &IndicatorFrame, latest: &IndicatorFrame) -> Signal {
    let (Some(dema), Some(prev_macd), Some(prev_signal), Some(macd), Some(signal)) = (
        latest.dema,
        previous.macd,
        previous.macd_signal,
        latest.macd,
        latest.macd_signal,
    ) else {
        return Signal::Hold;
    };

    let above_trend = latest.close > dema;
    let crossed_up = prev_macd < prev_signal && macd > signal;

    if above_trend && crossed_up {
        Signal::Enter(SignalReason::DemaMacdCross)
    } else {
        Signal::Hold
    }
}

fn evaluate_exit(
    previous: &IndicatorFrame,
    latest: &IndicatorFrame,
    position: &Position,
    config: &SignalConfig,
) -> Signal {
    // Price thresholds apply regardless of indicator warmup
    if latest.close <= config.stop_price(position.entry_price) {
        return Signal::Exit(SignalReason::StopLoss);
    }

    if latest.close >= config.target_price(position.entry_price) {
        return Signal::Exit(SignalReason::TargetHit);
    }

    if let (Some(prev_st), Some(st)) = (previous.supertrend, latest.supertrend) {
        if previous.close > prev_st && latest.close < st {
            return Signal::Exit(SignalReason::SupertrendFlip);
        }
    }

    Signal::Hold
}

/// Validate that candle timestamps are strictly increasing
///
/// # Returns
/// * `Ok(())` if every candle is later than the one before it
/// * `Err` naming the first out-of-order or duplicate timestamp
pub fn validate_candle_order(candles: &[Candle]) -> anyhow::Result<()> {
    for window in candles.windows(2) {
        if window[1].timestamp == window[0].timestamp {
            anyhow::bail!("Duplicate candle at {}", window[1].timestamp);
        }
        if window[1].timestamp < window[0].timestamp {
            anyhow::bail!(
                "Candles are not sorted by timestamp ({} after {})",
                window[1].timestamp,
                window[0].timestamp
            );
        }
    }

    Ok(())
}
