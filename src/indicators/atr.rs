/// Average True Range (ATR) indicator
///
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// Uses Wilder's smoothing. The first ATR is the simple average of the first
/// `period` true ranges, so it lands on candle index `period`.
use crate::models::Candle;

/// True range per candle; the first candle has no previous close
pub fn true_range_series(candles: &[Candle]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(candles.len());

    for i in 0..candles.len() {
        if i == 0 {
            out.push(None);
            continue;
        }

        let high = candles[i].high;
        let low = candles[i].low;
        let prev_close = candles[i - 1].close;

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());

        out.push(Some(tr));
    }

    out
}

/// Wilder-smoothed ATR aligned with candles
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return out;
    }

    let true_ranges = true_range_series(candles);

    let first_atr: f64 = true_ranges[1..=period]
        .iter()
        .map(|tr| tr.unwrap_or(0.0))
        .sum::<f64>()
        / period as f64;
    out[period] = Some(first_atr);

    let mut atr = first_atr;
    for i in (period + 1)..candles.len() {
        let tr = true_ranges[i].unwrap_or(0.0);
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
        out[i] = Some(atr);
    }

    out
}
