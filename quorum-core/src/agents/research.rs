//! Slow research signal: EMA drift and recent drawdown.
//!
//! score = clamp(slope% / 70 - drawdown% * 0.008, ±0.30)

use super::{AgentError, VoteProducer};
use crate::domain::candle::closes;
use crate::domain::{AgentKind, Candle, Vote};
use crate::indicators::ema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub min_history: usize,
    pub ema_period: usize,
    pub slope_lookback: usize,
    pub drawdown_window: usize,
    pub max_abs_score: f64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            min_history: 210,
            ema_period: 200,
            slope_lookback: 10,
            drawdown_window: 200,
            max_abs_score: 0.30,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResearchAgent {
    config: ResearchConfig,
}

impl ResearchAgent {
    pub fn new(config: ResearchConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, pair: &str, window: &[Candle], inputs_fresh: bool) -> Vote {
        let cfg = &self.config;
        if window.len() < cfg.min_history {
            return Vote::neutral(
                AgentKind::Research,
                pair,
                0.30,
                inputs_fresh,
                "insufficient history",
            );
        }

        let close = closes(window);
        let series = ema(&close, cfg.ema_period);
        if series.len() < 2 {
            return Vote::neutral(
                AgentKind::Research,
                pair,
                0.30,
                inputs_fresh,
                "insufficient data: ema",
            );
        }

        let cur = series[series.len() - 1];
        let lookback = cfg.slope_lookback.max(1);
        let prev = if series.len() > lookback {
            series[series.len() - lookback]
        } else {
            series[series.len() - 2]
        };
        let slope_pct = (cur - prev) / prev.abs().max(1e-12) * 100.0;

        let recent = &close[close.len().saturating_sub(cfg.drawdown_window)..];
        let peak = recent.iter().copied().fold(f64::MIN, f64::max);
        let last = close[close.len() - 1];
        let dd_pct = ((peak - last) / peak.max(1e-12) * 100.0).max(0.0);

        let raw = slope_pct / 70.0 - dd_pct * 0.008;
        let score = raw.clamp(-cfg.max_abs_score, cfg.max_abs_score);

        let mut base = 0.60;
        if window.len() < 400 {
            base -= 0.05;
        }
        if !inputs_fresh {
            base -= 0.05;
        }
        let vol = return_std(&close);
        let confidence = (base - (vol * 2.0).min(0.15)).clamp(0.30, 0.85);

        if !score.is_finite() || !confidence.is_finite() {
            return Vote::neutral(
                AgentKind::Research,
                pair,
                0.30,
                inputs_fresh,
                "invalid parameter: non-finite research inputs",
            );
        }

        Vote::new(
            AgentKind::Research,
            pair,
            score,
            confidence,
            inputs_fresh,
            format!("ema_slope_pct={slope_pct:.3} dd_pct={dd_pct:.2}"),
        )
    }
}

/// Sample standard deviation of simple returns.
fn return_std(close: &[f64]) -> f64 {
    let returns: Vec<f64> = close
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}

impl VoteProducer for ResearchAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Research
    }

    fn vote(&self, pair: &str, window: &[Candle], inputs_fresh: bool) -> Result<Vote, AgentError> {
        Ok(self.run(pair, window, inputs_fresh))
    }
}
