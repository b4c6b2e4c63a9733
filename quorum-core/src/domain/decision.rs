//! ConsensusDecision — the logged outcome of one consensus pass.

use super::side::{Direction, Side};
use super::vote::AgentKind;
use serde::{Deserialize, Serialize};

/// How one received vote took part in the fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContribution {
    pub agent: AgentKind,
    pub score: f64,
    pub confidence: f64,
    pub inputs_fresh: bool,
    /// `weight * confidence`; 0.0 for votes excluded from the fused score.
    pub effective_weight: f64,
}

/// Final decision for a pair. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusDecision {
    pub pair: String,
    /// Fused score S in [-1, 1], reported regardless of the decision.
    pub score: f64,
    pub decision: Direction,
    pub reason: String,
    pub breakdown: Vec<AgentContribution>,
    /// Direction S alone would give against the consensus thresholds.
    pub fused_bias: Direction,
}

impl ConsensusDecision {
    /// The side to trade, if the decision is directional.
    pub fn side(&self) -> Option<Side> {
        self.decision.side()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConsensusDecision {
        ConsensusDecision {
            pair: "BTCUSDT".into(),
            score: 0.42,
            decision: Direction::Long,
            reason: "technical driver, no veto".into(),
            breakdown: vec![AgentContribution {
                agent: AgentKind::Technical,
                score: 0.8,
                confidence: 0.9,
                inputs_fresh: true,
                effective_weight: 0.9,
            }],
            fused_bias: Direction::Hold,
        }
    }

    #[test]
    fn side_follows_decision() {
        let mut d = sample();
        assert_eq!(d.side(), Some(Side::Long));
        d.decision = Direction::Hold;
        assert_eq!(d.side(), None);
    }

    #[test]
    fn serializes_wire_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["decision"], "LONG");
        assert_eq!(json["fused_bias"], "HOLD");
        assert_eq!(json["breakdown"][0]["agent"], "technical");
    }
}
