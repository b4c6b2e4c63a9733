//! Exponential Moving Average (EMA).
//!
//! Seed: SMA of the first `period` values.
//! Recursive: EMA[t] = k * price[t] + (1 - k) * EMA[t-1], k = 2 / (period + 1).
//! Output length: len - period + 1 (empty when len < period).

/// EMA series starting at the seed value.
pub fn ema(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = prices[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(prices.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &p in &prices[period..] {
        prev = p * k + prev * (1.0 - k);
        out.push(prev);
    }
    out
}

/// Latest EMA value, if the series is long enough.
pub fn ema_last(prices: &[f64], period: usize) -> Option<f64> {
    ema(prices, period).last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn ema_period_1_equals_prices() {
        let prices = [10.0, 11.0, 12.5, 9.0];
        assert_eq!(ema(&prices, 1), prices.to_vec());
    }

    #[test]
    fn ema_seed_is_sma() {
        let out = ema(&[2.0, 4.0, 6.0], 3);
        assert_eq!(out.len(), 1);
        assert_approx(out[0], 4.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_recursion() {
        // k = 0.5 for period 3; seed = 4.0; next = 10*0.5 + 4*0.5 = 7.0
        let out = ema(&[2.0, 4.0, 6.0, 10.0], 3);
        assert_eq!(out.len(), 2);
        assert_approx(out[1], 7.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_short_input_is_empty() {
        assert!(ema(&[1.0, 2.0], 3).is_empty());
        assert!(ema(&[1.0, 2.0], 0).is_empty());
        assert_eq!(ema_last(&[1.0, 2.0], 3), None);
    }

    #[test]
    fn ema_constant_series_is_constant() {
        let prices = vec![50.0; 250];
        let out = ema(&prices, 200);
        assert_eq!(out.len(), 51);
        for v in out {
            assert_approx(v, 50.0, DEFAULT_EPSILON);
        }
    }
}
