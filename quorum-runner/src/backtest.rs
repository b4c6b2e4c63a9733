//! Backtest simulation — candle-by-candle replay of the decision pipeline.
//!
//! For every candle the trailing window is scored by the technical agent
//! (always fresh on replay) and passed through the same `decide` used live,
//! with a technical-only vote set. At most one position is open at a time:
//! - flat: `|S| >= score_min` and a LONG/SHORT decision open a trade at the
//!   candle's close,
//! - open: every later candle is checked for an exit, stop before target.
//!
//! Backtest PnL is fixed at `-1.0` R for a stop and `+rr` R for a target,
//! with exact fills at the level. The loop reads no clock and no randomness,
//! so identical inputs give identical results.

use crate::config::{ConfigError, QuorumConfig};
use crate::lifecycle::touched_level;
use crate::metrics::RStats;
use quorum_core::agents::{TechnicalAgent, TechnicalConfig};
use quorum_core::consensus::{decide, AgentWeights, Thresholds, SCORE_EPSILON};
use quorum_core::domain::{AgentContribution, Candle, Direction, Outcome, Side};
use quorum_core::orders::compute_order_levels;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestParams {
    /// Minimum |S| to open a trade.
    pub score_min: f64,
    pub rr: f64,
    pub sl_distance_pct: f64,
    /// Trailing window length handed to the technical agent.
    pub window: usize,
    pub risk_pct: f64,
    pub thresholds: Thresholds,
    pub technical: TechnicalConfig,
}

impl Default for BacktestParams {
    fn default() -> Self {
        Self {
            score_min: 0.0,
            rr: 1.5,
            sl_distance_pct: 0.004,
            window: 300,
            risk_pct: 0.01,
            thresholds: Thresholds::default(),
            technical: TechnicalConfig::default(),
        }
    }
}

impl BacktestParams {
    pub fn from_config(config: &QuorumConfig) -> Self {
        Self {
            score_min: config.backtest.score_min,
            rr: config.orders.rr,
            sl_distance_pct: config.orders.sl_distance_pct,
            window: config.backtest.window,
            risk_pct: config.orders.risk_pct,
            thresholds: config.consensus.thresholds.clone(),
            technical: config.technical.clone(),
        }
    }

    /// Reject parameter sets that could never open a trade.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.score_min.is_finite() || self.score_min < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "score_min must be non-negative, got {}",
                self.score_min
            )));
        }
        if !self.rr.is_finite() || self.rr < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "rr must be non-negative, got {}",
                self.rr
            )));
        }
        if !(self.sl_distance_pct > 0.0 && self.sl_distance_pct < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "sl_distance_pct must be in (0, 1), got {}",
                self.sl_distance_pct
            )));
        }
        if self.window < self.technical.min_history.max(1) {
            return Err(ConfigError::Invalid(format!(
                "window ({}) is shorter than technical.min_history ({})",
                self.window, self.technical.min_history
            )));
        }
        let t = &self.thresholds;
        if t.driver_long <= t.driver_short {
            return Err(ConfigError::Invalid(format!(
                "driver_long ({}) must be above driver_short ({})",
                t.driver_long, t.driver_short
            )));
        }
        Ok(())
    }
}

/// A completed simulated trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub pair: String,
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,

    // ── Entry ──
    pub entry_idx: usize,
    pub entry_t: i64,
    pub entry_score: f64,
    pub breakdown: Vec<AgentContribution>,

    // ── Exit ──
    pub exit_idx: usize,
    pub exit_t: i64,
    pub exit: f64,
    pub outcome: Outcome,
    pub pnl_r: f64,
}

impl BacktestTrade {
    pub fn bars_held(&self) -> usize {
        self.exit_idx - self.entry_idx
    }
}

/// A position still open when the candles ran out. Not counted in stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub pair: String,
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub entry_idx: usize,
    pub entry_t: i64,
    pub entry_score: f64,
    pub breakdown: Vec<AgentContribution>,
}

impl OpenPosition {
    fn close(
        self,
        exit_idx: usize,
        exit_t: i64,
        outcome: Outcome,
        exit: f64,
        pnl_r: f64,
    ) -> BacktestTrade {
        BacktestTrade {
            pair: self.pair,
            side: self.side,
            entry: self.entry,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            entry_idx: self.entry_idx,
            entry_t: self.entry_t,
            entry_score: self.entry_score,
            breakdown: self.breakdown,
            exit_idx,
            exit_t,
            exit,
            outcome,
            pnl_r,
        }
    }
}

/// Decision counts over every simulated candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalCounts {
    pub long: usize,
    pub short: usize,
    pub hold: usize,
}

impl SignalCounts {
    fn record(&mut self, direction: Direction) {
        match direction {
            Direction::Long => self.long += 1,
            Direction::Short => self.short += 1,
            Direction::Hold => self.hold += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestStats {
    pub pair: String,
    pub candles: usize,
    pub n_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub winrate: Option<f64>,
    pub profit_factor: Option<f64>,
    pub expectancy: Option<f64>,
    pub total_r: f64,
    pub max_drawdown_r: f64,
    pub signals: SignalCounts,
    pub long_stats: RStats,
    pub short_stats: RStats,
    pub open_at_end: Option<OpenPosition>,
    pub trades: Vec<BacktestTrade>,
}

impl BacktestStats {
    fn aggregate(
        pair: &str,
        candles: usize,
        signals: SignalCounts,
        trades: Vec<BacktestTrade>,
        open_at_end: Option<OpenPosition>,
    ) -> Self {
        let pnl: Vec<f64> = trades.iter().map(|t| t.pnl_r).collect();
        let side_pnl = |side: Side| -> Vec<f64> {
            trades
                .iter()
                .filter(|t| t.side == side)
                .map(|t| t.pnl_r)
                .collect()
        };
        let all = RStats::compute(&pnl);
        Self {
            pair: pair.to_string(),
            candles,
            n_trades: all.n_trades,
            wins: all.wins,
            losses: all.losses,
            winrate: all.winrate,
            profit_factor: all.profit_factor,
            expectancy: all.expectancy,
            total_r: all.total_r,
            max_drawdown_r: all.max_drawdown_r,
            signals,
            long_stats: RStats::compute(&side_pnl(Side::Long)),
            short_stats: RStats::compute(&side_pnl(Side::Short)),
            open_at_end,
            trades,
        }
    }
}

/// Replay `candles` for `pair` and aggregate the simulated trades.
pub fn simulate(pair: &str, candles: &[Candle], params: &BacktestParams) -> BacktestStats {
    let agent = TechnicalAgent::new(params.technical.clone());
    let weights = AgentWeights::default();
    let window = params.window.max(1);

    let mut trades = Vec::new();
    let mut open: Option<OpenPosition> = None;
    let mut signals = SignalCounts::default();

    for (idx, candle) in candles.iter().enumerate() {
        let start = (idx + 1).saturating_sub(window);
        let history = &candles[start..=idx];

        let vote = agent.run(pair, history, true);
        let decision = decide(pair, &[vote], &params.thresholds, &weights);
        signals.record(decision.decision);

        if let Some(position) = open.take() {
            match touched_level(position.side, position.stop_loss, position.take_profit, candle) {
                Some((outcome, exit)) => {
                    let pnl_r = match outcome {
                        Outcome::Tp => params.rr,
                        _ => -1.0,
                    };
                    trades.push(position.close(idx, candle.t, outcome, exit, pnl_r));
                }
                None => open = Some(position),
            }
            continue;
        }

        if decision.score.abs() < params.score_min - SCORE_EPSILON {
            continue;
        }
        let Some(side) = decision.side() else {
            continue;
        };

        match compute_order_levels(
            side,
            candle.c,
            params.risk_pct,
            params.rr,
            params.sl_distance_pct,
        ) {
            Ok(levels) => {
                open = Some(OpenPosition {
                    pair: pair.to_string(),
                    side,
                    entry: levels.entry,
                    stop_loss: levels.stop_loss,
                    take_profit: levels.take_profit,
                    entry_idx: idx,
                    entry_t: candle.t,
                    entry_score: decision.score,
                    breakdown: decision.breakdown,
                });
            }
            Err(e) => {
                tracing::debug!(pair, idx, error = %e, "skipping entry");
            }
        }
    }

    let stats = BacktestStats::aggregate(pair, candles.len(), signals, trades, open);
    tracing::debug!(
        pair,
        long = stats.signals.long,
        short = stats.signals.short,
        hold = stats.signals.hold,
        closed = stats.n_trades,
        open_at_end = stats.open_at_end.is_some(),
        "backtest finished"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let c = 100.0 + i as f64;
                Candle::new(i as i64 * 900, c, c + 0.5, c - 0.5, c, 1.0)
            })
            .collect()
    }

    fn long_params() -> BacktestParams {
        BacktestParams {
            thresholds: Thresholds::symmetric(0.6, -0.6),
            rr: 1.5,
            sl_distance_pct: 0.01,
            ..BacktestParams::default()
        }
    }

    #[test]
    fn validate_rejects_params_that_cannot_trade() {
        assert!(BacktestParams::default().validate().is_ok());
        let short_window = BacktestParams {
            window: 50,
            ..BacktestParams::default()
        };
        assert!(short_window.validate().is_err());
        let zero_stop = BacktestParams {
            sl_distance_pct: 0.0,
            ..BacktestParams::default()
        };
        assert!(zero_stop.validate().is_err());
        let crossed = BacktestParams {
            thresholds: Thresholds::symmetric(-0.2, 0.2),
            ..BacktestParams::default()
        };
        assert!(crossed.validate().is_err());
    }

    #[test]
    fn too_little_history_never_trades() {
        let stats = simulate("X", &ramp(150), &long_params());
        assert_eq!(stats.n_trades, 0);
        assert_eq!(stats.winrate, None);
        assert_eq!(stats.expectancy, None);
        assert!(stats.open_at_end.is_none());
        assert_eq!(stats.signals.hold, 150);
    }

    #[test]
    fn ramp_opens_long_on_first_qualifying_candle() {
        let stats = simulate("X", &ramp(212), &long_params());
        // Index 209 is the first with 210 candles of history; it opens but
        // cannot exit on its own candle.
        assert_eq!(stats.signals.long, 3);
        assert!(stats.trades.is_empty());
        let open = stats.open_at_end.as_ref().map(|o| (o.entry_idx, o.side, o.entry));
        assert_eq!(open, Some((209, Side::Long, 309.0)));
    }

    #[test]
    fn score_min_gate_blocks_entries() {
        let params = BacktestParams {
            score_min: 0.9,
            ..long_params()
        };
        let stats = simulate("X", &ramp(300), &params);
        assert_eq!(stats.n_trades, 0);
        assert!(stats.open_at_end.is_none());
        assert!(stats.signals.long > 0);
    }

    #[test]
    fn target_hit_pays_rr() {
        // Ramp rises 1.0 per candle: a 1% stop (≈3.1) is never hit and the
        // 1.5R target (≈4.7 above entry) is reached within a few candles.
        let stats = simulate("X", &ramp(260), &long_params());
        assert!(stats.n_trades > 0);
        assert!(stats.trades.iter().all(|t| t.outcome == Outcome::Tp));
        assert!(stats.trades.iter().all(|t| t.pnl_r == 1.5));
        assert!(stats.trades.iter().all(|t| t.exit_idx > t.entry_idx));
        assert_eq!(stats.losses, 0);
        assert_eq!(stats.profit_factor, None);
        assert_eq!(stats.winrate, Some(1.0));
        assert_eq!(stats.short_stats.n_trades, 0);
    }

    #[test]
    fn stop_is_checked_before_target() {
        let mut candles = ramp(211);
        // The appended candle spans both levels of the trade opened at 209.
        let c = 309.0;
        candles.push(Candle::new(211 * 900, c, c * 1.2, c * 0.8, c, 1.0));
        let stats = simulate("X", &candles, &long_params());
        let first = &stats.trades[0];
        assert_eq!(first.entry_idx, 209);
        assert_eq!(first.outcome, Outcome::Sl);
        assert_eq!(first.pnl_r, -1.0);
        assert_eq!(first.exit, first.stop_loss);
    }
}
