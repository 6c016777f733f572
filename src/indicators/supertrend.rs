//! Supertrend, an ATR-based trend line with a direction flag.
//!
//! basic bands: hl2 +/- multiplier * ATR. The final upper band only moves
//! down (and the lower band only up) while the previous close stays inside
//! it; otherwise it resets to the basic band. An uptrend flips down when the
//! close falls below the final lower band, a downtrend flips up when the
//! close rises above the final upper band. The emitted value is the lower
//! band in an uptrend and the upper band in a downtrend.
//!
//! Available from the first ATR value (index `period`). The first available
//! candle starts in an uptrend.

use super::atr::atr_series;
use crate::models::{Candle, TrendDirection};

pub const DEFAULT_PERIOD: usize = 7;
pub const DEFAULT_MULTIPLIER: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupertrendPoint {
    pub value: f64,
    pub direction: TrendDirection,
    pub upper_band: f64,
    pub lower_band: f64,
}

pub fn calculate_supertrend(
    candles: &[Candle],
    period: usize,
    multiplier: f64,
) -> Vec<Option<SupertrendPoint>> {
    let mut out = vec![None; candles.len()];
    let atr = atr_series(candles, period);

    let start = match atr.iter().position(|v| v.is_some()) {
        Some(idx) => idx,
        None => return out,
    };

    let mut prev: Option<SupertrendPoint> = None;

    for i in start..candles.len() {
        let Some(atr_value) = atr[i] else {
            prev = None;
            continue;
        };

        let candle = &candles[i];
        let hl2 = (candle.high + candle.low) / 2.0;
        let basic_upper = hl2 + multiplier * atr_value;
        let basic_lower = hl2 - multiplier * atr_value;

        let point = match prev {
            None => SupertrendPoint {
                value: basic_lower,
                direction: TrendDirection::Up,
                upper_band: basic_upper,
                lower_band: basic_lower,
            },
            Some(p) => {
                let prev_close = candles[i - 1].close;

                let upper_band = if basic_upper < p.upper_band || prev_close > p.upper_band {
                    basic_upper
                } else {
                    p.upper_band
                };

                let lower_band = if basic_lower > p.lower_band || prev_close < p.lower_band {
                    basic_lower
                } else {
                    p.lower_band
                };

                let direction = match p.direction {
                    TrendDirection::Up if candle.close < lower_band => TrendDirection::Down,
                    TrendDirection::Down if candle.close > upper_band => TrendDirection::Up,
                    unchanged => unchanged,
                };

                let value = match direction {
                    TrendDirection::Up => lower_band,
                    TrendDirection::Down => upper_band,
                };

                SupertrendPoint {
                    value,
                    direction,
                    upper_band,
                    lower_band,
                }
            }
        };

        out[i] = Some(point);
        prev = Some(point);
    }

    out
}
