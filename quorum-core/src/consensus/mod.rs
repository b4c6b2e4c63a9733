//! Consensus engine: fuses a pair's votes into one decision.
//!
//! One pure pass per call, no persisted state:
//! 1. critical gate: the technical vote must be present and fresh,
//! 2. directional proposal from the technical score vs. the driver thresholds,
//! 3. veto by any other fresh, confident agent of the opposite sign,
//! 4. fused score S over all fresh votes, always computed for analytics.
//!
//! Only the technical vote drives direction. S is reported alongside and
//! classified into `fused_bias`, but never changes the decision.

use crate::domain::{AgentContribution, AgentKind, ConsensusDecision, Direction, Vote};
use serde::{Deserialize, Serialize};

/// Tolerance for every score/threshold comparison.
pub const SCORE_EPSILON: f64 = 1e-9;

pub const REASON_NO_TECHNICAL: &str = "no technical signal";
pub const REASON_TECHNICAL_STALE: &str = "critical stale: technical";
pub const REASON_NO_EDGE: &str = "no technical edge";
pub const REASON_NO_VETO: &str = "technical driver, no veto";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Fused-score thresholds, used for `fused_bias`.
    pub long: f64,
    pub short: f64,
    /// Technical trigger thresholds for the directional proposal.
    pub driver_long: f64,
    pub driver_short: f64,
    /// A vetoing agent must exceed both minimums.
    pub veto_min_score: f64,
    pub veto_min_confidence: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            long: 0.4,
            short: -0.4,
            driver_long: 0.7,
            driver_short: -0.6,
            veto_min_score: 0.5,
            veto_min_confidence: 0.6,
        }
    }
}

impl Thresholds {
    /// Set both consensus and driver thresholds to the same symmetric pair.
    pub fn symmetric(long: f64, short: f64) -> Self {
        Self {
            long,
            short,
            driver_long: long,
            driver_short: short,
            ..Self::default()
        }
    }

    fn classify(score: f64, long: f64, short: f64) -> Direction {
        if score >= long - SCORE_EPSILON {
            Direction::Long
        } else if score <= short + SCORE_EPSILON {
            Direction::Short
        } else {
            Direction::Hold
        }
    }
}

/// Per-agent fusion weights. Negative weights count as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentWeights {
    pub technical: f64,
    pub news: f64,
    pub sentiment: f64,
    pub research: f64,
}

impl Default for AgentWeights {
    fn default() -> Self {
        Self {
            technical: 1.0,
            news: 1.0,
            sentiment: 1.0,
            research: 1.0,
        }
    }
}

impl AgentWeights {
    pub fn weight(&self, agent: AgentKind) -> f64 {
        let w = match agent {
            AgentKind::Technical => self.technical,
            AgentKind::News => self.news,
            AgentKind::Sentiment => self.sentiment,
            AgentKind::Research => self.research,
        };
        if w.is_finite() {
            w.max(0.0)
        } else {
            0.0
        }
    }
}

fn exceeds(value: f64, minimum: f64) -> bool {
    value - minimum > SCORE_EPSILON
}

/// Fused score and per-vote breakdown.
///
/// Only valid, fresh votes with positive confidence contribute.
pub fn fuse(votes: &[Vote], weights: &AgentWeights) -> (f64, Vec<AgentContribution>) {
    let mut num = 0.0;
    let mut den = 0.0;
    let breakdown = votes
        .iter()
        .map(|v| {
            let eligible = v.is_valid() && v.inputs_fresh && v.confidence > 0.0;
            let effective_weight = if eligible {
                weights.weight(v.agent) * v.confidence
            } else {
                0.0
            };
            // Invalid scores may be non-finite; keep them out of the sums.
            if eligible {
                num += v.score * effective_weight;
                den += effective_weight;
            }
            AgentContribution {
                agent: v.agent,
                score: v.score,
                confidence: v.confidence,
                inputs_fresh: v.inputs_fresh,
                effective_weight,
            }
        })
        .collect();

    let score = if den > 0.0 {
        (num / den).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    (score, breakdown)
}

/// Agents whose fresh, confident vote opposes `proposal`, in vote order.
pub fn vetoes(votes: &[Vote], proposal: Direction, thresholds: &Thresholds) -> Vec<AgentKind> {
    let opposing_sign = match proposal {
        Direction::Long => -1.0,
        Direction::Short => 1.0,
        Direction::Hold => return Vec::new(),
    };
    let mut agents = Vec::new();
    for v in votes {
        if v.agent.is_critical() || !v.inputs_fresh || !v.is_valid() {
            continue;
        }
        let opposes = v.score * opposing_sign > 0.0;
        if opposes
            && exceeds(v.confidence, thresholds.veto_min_confidence)
            && exceeds(v.score.abs(), thresholds.veto_min_score)
            && !agents.contains(&v.agent)
        {
            agents.push(v.agent);
        }
    }
    agents
}

/// Decide LONG, SHORT or HOLD for `pair` from its votes.
pub fn decide(
    pair: &str,
    votes: &[Vote],
    thresholds: &Thresholds,
    weights: &AgentWeights,
) -> ConsensusDecision {
    let (score, breakdown) = fuse(votes, weights);
    let fused_bias = Thresholds::classify(score, thresholds.long, thresholds.short);
    let finish = |decision: Direction, reason: String| ConsensusDecision {
        pair: pair.to_string(),
        score,
        decision,
        reason,
        breakdown: breakdown.clone(),
        fused_bias,
    };

    let technical = votes
        .iter()
        .find(|v| v.agent == AgentKind::Technical && v.is_valid());
    let Some(technical) = technical else {
        return finish(Direction::Hold, REASON_NO_TECHNICAL.to_string());
    };
    if !technical.inputs_fresh {
        return finish(Direction::Hold, REASON_TECHNICAL_STALE.to_string());
    }

    let proposal = Thresholds::classify(
        technical.score,
        thresholds.driver_long,
        thresholds.driver_short,
    );
    if proposal == Direction::Hold {
        return finish(Direction::Hold, REASON_NO_EDGE.to_string());
    }

    let vetoed_by = vetoes(votes, proposal, thresholds);
    if !vetoed_by.is_empty() {
        let names: Vec<&str> = vetoed_by.iter().map(|a| a.name()).collect();
        return finish(Direction::Hold, format!("vetoed by: {}", names.join(", ")));
    }

    tracing::debug!(pair, score, decision = %proposal, "consensus");
    finish(proposal, REASON_NO_VETO.to_string())
}
