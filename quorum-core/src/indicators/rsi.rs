//! Relative Strength Index (RSI).
//!
//! Simple averages of gains and losses over the trailing `period` deltas.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Edge cases: avg_loss == 0 → 100; fewer than period + 1 prices → None.

pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    let n = prices.len();
    if period == 0 || n < period + 1 {
        return None;
    }

    let mut gain = 0.0;
    let mut loss = 0.0;
    for i in (n - period)..n {
        let diff = prices[i] - prices[i - 1];
        if diff > 0.0 {
            gain += diff;
        } else {
            loss -= diff;
        }
    }
    let avg_gain = gain / period as f64;
    let avg_loss = loss / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn rsi_all_gains_is_100() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&prices, 14), Some(100.0));
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert_approx(rsi(&prices, 14).unwrap(), 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rsi_flat_series_is_100() {
        // No losses at all, so the zero-loss rule applies.
        assert_eq!(rsi(&[5.0; 16], 14), Some(100.0));
    }

    #[test]
    fn rsi_balanced_moves_is_50() {
        let prices = [10.0, 11.0, 10.0, 11.0, 10.0];
        assert_approx(rsi(&prices, 4).unwrap(), 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rsi_uses_only_trailing_deltas() {
        // Early crash is outside the 2-delta window.
        let prices = [100.0, 10.0, 11.0, 12.0];
        assert_eq!(rsi(&prices, 2), Some(100.0));
    }

    #[test]
    fn rsi_insufficient_history() {
        assert_eq!(rsi(&[1.0; 14], 14), None);
        assert_eq!(rsi(&[1.0; 5], 0), None);
    }
}
