//! R-multiple performance metrics — pure functions over realized trade results.
//!
//! Every metric takes a slice of per-trade `pnl_r` values in trade order.
//! Ratios that are undefined for the input return `None` instead of NaN.

use serde::{Deserialize, Serialize};

/// Aggregate statistics over a list of R-multiples.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RStats {
    pub n_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub winrate: Option<f64>,
    pub profit_factor: Option<f64>,
    pub expectancy: Option<f64>,
    pub total_r: f64,
    pub max_drawdown_r: f64,
}

impl RStats {
    pub fn compute(pnl_r: &[f64]) -> Self {
        Self {
            n_trades: pnl_r.len(),
            wins: pnl_r.iter().filter(|r| **r > 0.0).count(),
            losses: pnl_r.iter().filter(|r| **r < 0.0).count(),
            winrate: winrate(pnl_r),
            profit_factor: profit_factor(pnl_r),
            expectancy: expectancy(pnl_r),
            total_r: pnl_r.iter().sum(),
            max_drawdown_r: max_drawdown_r(pnl_r),
        }
    }
}

/// Fraction of trades with positive R. `None` without trades.
pub fn winrate(pnl_r: &[f64]) -> Option<f64> {
    if pnl_r.is_empty() {
        return None;
    }
    let wins = pnl_r.iter().filter(|r| **r > 0.0).count();
    Some(wins as f64 / pnl_r.len() as f64)
}

/// Gross profit over gross loss. `None` when there is no losing trade.
pub fn profit_factor(pnl_r: &[f64]) -> Option<f64> {
    let gross_profit: f64 = pnl_r.iter().filter(|r| **r > 0.0).sum();
    let gross_loss: f64 = -pnl_r.iter().filter(|r| **r < 0.0).sum::<f64>();
    if gross_loss > 0.0 {
        Some(gross_profit / gross_loss)
    } else {
        None
    }
}

/// Mean R per trade. `None` without trades.
pub fn expectancy(pnl_r: &[f64]) -> Option<f64> {
    if pnl_r.is_empty() {
        return None;
    }
    Some(pnl_r.iter().sum::<f64>() / pnl_r.len() as f64)
}

/// Largest peak-to-trough decline of the cumulative R curve, starting at 0.
/// Reported as a non-negative number of R.
pub fn max_drawdown_r(pnl_r: &[f64]) -> f64 {
    let mut peak = 0.0_f64;
    let mut max_dd = 0.0_f64;
    for equity in cumulative_r(pnl_r) {
        peak = peak.max(equity);
        max_dd = max_dd.max(peak - equity);
    }
    max_dd
}

/// Cumulative R after each trade.
pub fn cumulative_r(pnl_r: &[f64]) -> Vec<f64> {
    pnl_r
        .iter()
        .scan(0.0, |acc, r| {
            *acc += r;
            Some(*acc)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_no_ratios() {
        let stats = RStats::compute(&[]);
        assert_eq!(stats.n_trades, 0);
        assert_eq!(stats.winrate, None);
        assert_eq!(stats.profit_factor, None);
        assert_eq!(stats.expectancy, None);
        assert_eq!(stats.max_drawdown_r, 0.0);
    }

    #[test]
    fn mixed_results() {
        let r = [1.5, -1.0, 1.5, -1.0, -1.0];
        let stats = RStats::compute(&r);
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.losses, 3);
        assert_eq!(stats.winrate, Some(0.4));
        assert_eq!(stats.profit_factor, Some(1.0));
        assert!((stats.expectancy.unwrap()).abs() < 1e-12);
        // curve: 1.5, 0.5, 2.0, 1.0, 0.0 → worst decline 2.0
        assert!((stats.max_drawdown_r - 2.0).abs() < 1e-12);
    }

    #[test]
    fn no_losses_means_no_profit_factor() {
        assert_eq!(profit_factor(&[1.5, 1.5]), None);
        assert_eq!(winrate(&[1.5, 1.5]), Some(1.0));
    }

    #[test]
    fn drawdown_from_initial_zero() {
        assert!((max_drawdown_r(&[-1.0, -1.0, 1.5]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn cumulative_curve() {
        assert_eq!(cumulative_r(&[1.0, -0.5, 2.0]), vec![1.0, 0.5, 2.5]);
    }
}
