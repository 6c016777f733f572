//! Exponential and double-exponential moving averages
//!
//! Series functions return one entry per input sample. `None` marks the
//! warmup region where the average is not yet defined.

/// EMA series over plain prices
///
/// Seeded with the SMA of the first `period` prices, so the first
/// `period - 1` entries are `None`.
pub fn ema_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let values: Vec<Option<f64>> = prices.iter().copied().map(Some).collect();
    ema_of(&values, period)
}

/// EMA series over a series that may itself have a warmup prefix
///
/// Seeding starts at the first available sample. A gap restarts seeding.
pub fn ema_of(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    if period == 0 {
        out.resize(values.len(), None);
        return out;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut seed_sum = 0.0;
    let mut seed_count = 0usize;
    let mut ema: Option<f64> = None;

    for value in values {
        match (*value, ema) {
            (None, _) => {
                seed_sum = 0.0;
                seed_count = 0;
                ema = None;
                out.push(None);
            }
            (Some(v), Some(prev)) => {
                let next = (v - prev) * multiplier + prev;
                ema = Some(next);
                out.push(ema);
            }
            (Some(v), None) => {
                seed_sum += v;
                seed_count += 1;
                if seed_count == period {
                    ema = Some(seed_sum / period as f64);
                }
                out.push(ema);
            }
        }
    }

    out
}

/// Double Exponential Moving Average series
///
/// DEMA = 2 * EMA(prices) - EMA(EMA(prices)). The first available value is at
/// index `2 * period - 2`.
pub fn dema_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let ema1 = ema_series(prices, period);
    let ema2 = ema_of(&ema1, period);

    ema1.iter()
        .zip(ema2.iter())
        .map(|(e1, e2)| match (e1, e2) {
            (Some(a), Some(b)) => Some(2.0 * a - b),
            _ => None,
        })
        .collect()
}
