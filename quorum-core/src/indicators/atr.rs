//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|), from index 1.
//! ATR = simple mean of the last `period` true ranges.

/// True range series; element `i` corresponds to bar `i + 1`.
pub fn true_range(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
    let n = closes.len().min(highs.len()).min(lows.len());
    (1..n)
        .map(|i| {
            let prev = closes[i - 1];
            (highs[i] - lows[i])
                .max((highs[i] - prev).abs())
                .max((lows[i] - prev).abs())
        })
        .collect()
}

pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    let n = closes.len();
    if period == 0 || n != highs.len() || n != lows.len() || n < period + 1 {
        return None;
    }
    let trs = true_range(highs, lows, closes);
    let tail = &trs[trs.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}
