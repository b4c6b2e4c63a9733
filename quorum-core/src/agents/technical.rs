//! Technical scoring agent.
//!
//! Turns an indicator snapshot of the trailing window into a vote:
//! - trend term: distance of price from EMA200 in ATR units,
//! - RSI term: discrete bands over a fast and a slow RSI,
//! - volatility regime: scales both terms and penalizes confidence.
//!
//! The agent never fails. Short history, missing indicators and degenerate
//! prices all produce a neutral vote (score 0.0, confidence 0.2) whose
//! explanation names the cause.

use super::{AgentError, VoteProducer};
use crate::domain::candle::{closes, hlc};
use crate::domain::{AgentKind, Candle, Vote};
use crate::indicators::{atr, ema_last, rsi};
use serde::{Deserialize, Serialize};
use std::fmt;

const NEUTRAL_CONFIDENCE: f64 = 0.2;

/// Scoring constants. Every field can be overridden from `[technical]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnicalConfig {
    pub min_history: usize,

    // ── Indicator periods ──
    pub ema_period: usize,
    pub rsi_fast: usize,
    pub rsi_slow: usize,
    pub atr_period: usize,

    // ── Trend term ──
    /// ATR multiple (K) that maps price-EMA distance onto the trend scale.
    pub trend_atr_mult: f64,
    pub trend_clamp: f64,
    pub trend_deadzone: f64,
    pub trend_deadzone_scale: f64,

    // ── Score ──
    pub score_deadzone: f64,
    pub trend_weight: f64,
    pub rsi_weight: f64,

    // ── Volatility regime bounds on atr_pct ──
    pub ultra_low_max: f64,
    pub low_max: f64,
    pub normal_max: f64,

    // ── Confidence ──
    pub base_confidence: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    pub stale_penalty: f64,
}

impl Default for TechnicalConfig {
    fn default() -> Self {
        Self {
            min_history: 210,
            ema_period: 200,
            rsi_fast: 14,
            rsi_slow: 50,
            atr_period: 14,
            trend_atr_mult: 2.0,
            trend_clamp: 3.0,
            trend_deadzone: 0.25,
            trend_deadzone_scale: 0.2,
            score_deadzone: 0.15,
            trend_weight: 0.8,
            rsi_weight: 0.2,
            ultra_low_max: 0.0015,
            low_max: 0.003,
            normal_max: 0.012,
            base_confidence: 0.9,
            min_confidence: 0.1,
            max_confidence: 0.95,
            stale_penalty: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityRegime {
    UltraLow,
    Low,
    Normal,
    High,
}

impl VolatilityRegime {
    pub fn classify(atr_pct: f64, config: &TechnicalConfig) -> Self {
        if atr_pct < config.ultra_low_max {
            VolatilityRegime::UltraLow
        } else if atr_pct < config.low_max {
            VolatilityRegime::Low
        } else if atr_pct <= config.normal_max {
            VolatilityRegime::Normal
        } else {
            VolatilityRegime::High
        }
    }

    /// (trend, rsi) weight multipliers.
    pub fn multipliers(&self) -> (f64, f64) {
        match self {
            VolatilityRegime::UltraLow => (0.5, 0.5),
            VolatilityRegime::Low => (0.75, 0.75),
            VolatilityRegime::Normal => (1.0, 1.0),
            VolatilityRegime::High => (1.0, 0.5),
        }
    }

    pub fn confidence_penalty(&self) -> f64 {
        match self {
            VolatilityRegime::UltraLow => 0.3,
            VolatilityRegime::Low => 0.15,
            VolatilityRegime::Normal => 0.0,
            VolatilityRegime::High => 0.2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VolatilityRegime::UltraLow => "ultra_low",
            VolatilityRegime::Low => "low",
            VolatilityRegime::Normal => "normal",
            VolatilityRegime::High => "high",
        }
    }
}

impl fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trend term in [-1, 1].
pub fn trend_term(price: f64, ema: f64, atr: f64, config: &TechnicalConfig) -> f64 {
    let clamp = config.trend_clamp;
    let raw = (price - ema) / (atr * config.trend_atr_mult);
    let norm = raw.clamp(-clamp, clamp) / clamp;
    let norm = if norm.abs() < config.trend_deadzone {
        norm * config.trend_deadzone_scale
    } else {
        norm
    };
    norm.clamp(-1.0, 1.0)
}

/// RSI term from fast and slow RSI bands.
pub fn rsi_term(fast: f64, slow: f64) -> f64 {
    if fast < 28.0 && slow < 45.0 {
        0.7
    } else if fast < 35.0 {
        0.3
    } else if fast > 72.0 && slow > 55.0 {
        -0.7
    } else if fast > 65.0 {
        -0.3
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct TechnicalAgent {
    config: TechnicalConfig,
}

impl TechnicalAgent {
    pub fn new(config: TechnicalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TechnicalConfig {
        &self.config
    }

    /// Score the trailing window. Never fails.
    pub fn run(&self, pair: &str, window: &[Candle], inputs_fresh: bool) -> Vote {
        let cfg = &self.config;
        let neutral = |why: String| {
            Vote::neutral(AgentKind::Technical, pair, NEUTRAL_CONFIDENCE, inputs_fresh, why)
        };

        if window.len() < cfg.min_history {
            return neutral("insufficient history".to_string());
        }

        let close = closes(window);
        let (highs, lows, _) = hlc(window);

        let Some(ema) = ema_last(&close, cfg.ema_period) else {
            return neutral(format!("insufficient data: ema{}", cfg.ema_period));
        };
        let Some(rsi_fast) = rsi(&close, cfg.rsi_fast) else {
            return neutral(format!("insufficient data: rsi{}", cfg.rsi_fast));
        };
        let Some(rsi_slow) = rsi(&close, cfg.rsi_slow) else {
            return neutral(format!("insufficient data: rsi{}", cfg.rsi_slow));
        };
        let Some(atr) = atr(&highs, &lows, &close, cfg.atr_period) else {
            return neutral(format!("insufficient data: atr{}", cfg.atr_period));
        };

        let price = close[close.len() - 1];
        if !price.is_finite() || price <= 0.0 {
            return neutral(format!("invalid parameter: price {price}"));
        }
        if !atr.is_finite() || atr <= 0.0 {
            return neutral(format!("invalid parameter: atr {atr}"));
        }
        if !ema.is_finite() || !rsi_fast.is_finite() || !rsi_slow.is_finite() {
            return neutral("invalid parameter: non-finite indicator".to_string());
        }

        let atr_pct = atr / price;
        let regime = VolatilityRegime::classify(atr_pct, cfg);
        let (trend_mult, rsi_mult) = regime.multipliers();

        let trend = trend_term(price, ema, atr, cfg);
        let momentum = rsi_term(rsi_fast, rsi_slow);

        let raw = trend * cfg.trend_weight * trend_mult + momentum * cfg.rsi_weight * rsi_mult;
        let mut score = raw.clamp(-1.0, 1.0);
        if score.abs() < cfg.score_deadzone {
            score = 0.0;
        }

        let mut confidence = cfg.base_confidence - regime.confidence_penalty();
        if !inputs_fresh {
            confidence -= cfg.stale_penalty;
        }
        let confidence = confidence.clamp(cfg.min_confidence, cfg.max_confidence);

        tracing::debug!(
            pair,
            price,
            ema,
            rsi_fast,
            rsi_slow,
            atr,
            regime = regime.as_str(),
            score,
            "technical vote"
        );

        Vote::new(
            AgentKind::Technical,
            pair,
            score,
            confidence,
            inputs_fresh,
            format!(
                "trend={trend:.3} rsi{}={rsi_fast:.1} rsi{}={rsi_slow:.1} regime={regime} atr_pct={atr_pct:.5}",
                cfg.rsi_fast, cfg.rsi_slow
            ),
        )
    }
}

impl VoteProducer for TechnicalAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Technical
    }

    fn vote(&self, pair: &str, window: &[Candle], inputs_fresh: bool) -> Result<Vote, AgentError> {
        Ok(self.run(pair, window, inputs_fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;

    fn ramp(n: usize, step: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let c = 100.0 + i as f64 * step;
                Candle::new(i as i64 * 900, c, c + 0.5, c - 0.5, c, 1000.0)
            })
            .collect()
    }

    #[test]
    fn short_window_is_neutral() {
        let vote = TechnicalAgent::default().run("BTCUSDT", &ramp(209, 1.0), true);
        assert_eq!(vote.score, 0.0);
        assert_eq!(vote.confidence, 0.2);
        assert_eq!(vote.explanation, "insufficient history");
    }

    #[test]
    fn steady_uptrend_scores_long() {
        // Trend saturates at +1; both RSIs are 100 so the overbought band applies.
        let vote = TechnicalAgent::default().run("BTCUSDT", &ramp(300, 1.0), true);
        assert_approx(vote.score, 0.8 - 0.14, 1e-9);
        assert_approx(vote.confidence, 0.9, 1e-12);
        assert!(vote.explanation.contains("regime=normal"));
    }

    #[test]
    fn stale_inputs_reduce_confidence() {
        let vote = TechnicalAgent::default().run("BTCUSDT", &ramp(300, 1.0), false);
        assert_approx(vote.confidence, 0.6, 1e-12);
        assert!(!vote.inputs_fresh);
    }

    #[test]
    fn flat_range_has_zero_atr_and_goes_neutral() {
        let candles: Vec<Candle> = (0..250)
            .map(|i| Candle::new(i, 50.0, 50.0, 50.0, 50.0, 1.0))
            .collect();
        let vote = TechnicalAgent::default().run("X", &candles, true);
        assert_eq!(vote.score, 0.0);
        assert_eq!(vote.confidence, 0.2);
        assert!(vote.explanation.starts_with("invalid parameter"));
    }

    #[test]
    fn non_positive_price_goes_neutral() {
        let mut candles = ramp(250, 1.0);
        let last = candles.len() - 1;
        candles[last].c = -1.0;
        let vote = TechnicalAgent::default().run("X", &candles, true);
        assert_eq!(vote.score, 0.0);
        assert!(vote.explanation.contains("price"));
    }

    #[test]
    fn missing_indicator_is_named() {
        let cfg = TechnicalConfig {
            min_history: 10,
            ..TechnicalConfig::default()
        };
        let vote = TechnicalAgent::new(cfg).run("X", &ramp(50, 1.0), true);
        assert_eq!(vote.score, 0.0);
        assert_eq!(vote.explanation, "insufficient data: ema200");
    }

    #[test]
    fn trend_deadzone_attenuates() {
        let cfg = TechnicalConfig::default();
        // raw = 1 / (1 * 2) = 0.5 → norm = 0.5 / 3 ≈ 0.1667 < 0.25 → ×0.2
        assert_approx(trend_term(101.0, 100.0, 1.0, &cfg), 0.5 / 3.0 * 0.2, 1e-12);
        // raw clamped at 3 → norm 1
        assert_approx(trend_term(200.0, 100.0, 1.0, &cfg), 1.0, 1e-12);
        assert_approx(trend_term(0.0, 100.0, 1.0, &cfg), -1.0, 1e-12);
    }

    #[test]
    fn rsi_bands() {
        assert_eq!(rsi_term(20.0, 40.0), 0.7);
        assert_eq!(rsi_term(20.0, 50.0), 0.3);
        assert_eq!(rsi_term(33.0, 40.0), 0.3);
        assert_eq!(rsi_term(80.0, 60.0), -0.7);
        assert_eq!(rsi_term(80.0, 50.0), -0.3);
        assert_eq!(rsi_term(68.0, 60.0), -0.3);
        assert_eq!(rsi_term(50.0, 50.0), 0.0);
    }

    #[test]
    fn regime_buckets() {
        let cfg = TechnicalConfig::default();
        assert_eq!(VolatilityRegime::classify(0.001, &cfg), VolatilityRegime::UltraLow);
        assert_eq!(VolatilityRegime::classify(0.002, &cfg), VolatilityRegime::Low);
        assert_eq!(VolatilityRegime::classify(0.005, &cfg), VolatilityRegime::Normal);
        assert_eq!(VolatilityRegime::classify(0.012, &cfg), VolatilityRegime::Normal);
        assert_eq!(VolatilityRegime::classify(0.02, &cfg), VolatilityRegime::High);
    }

    #[test]
    fn marginal_score_is_flattened() {
        // Tiny drift: trend inside the deadzone, RSI 100 → overbought penalty.
        // trend ≈ small, rsi term -0.7*0.2 = -0.14 → |score| < 0.15 → 0
        let candles: Vec<Candle> = (0..300)
            .map(|i| {
                let c = 100.0 + i as f64 * 0.0001;
                Candle::new(i, c, c + 0.2, c - 0.2, c, 1.0)
            })
            .collect();
        let vote = TechnicalAgent::default().run("X", &candles, true);
        assert_eq!(vote.score, 0.0);
    }
}
