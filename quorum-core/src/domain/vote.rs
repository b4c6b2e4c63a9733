//! Vote — one agent's scored opinion about one pair.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The closed set of agents that may contribute a vote.
///
/// Consensus logic branches on this enum, never on free-form agent names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Technical,
    News,
    Sentiment,
    Research,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Technical,
        AgentKind::News,
        AgentKind::Sentiment,
        AgentKind::Research,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::Technical => "technical",
            AgentKind::News => "news",
            AgentKind::Sentiment => "sentiment",
            AgentKind::Research => "research",
        }
    }

    /// A critical agent's vote is mandatory and must be fresh.
    pub fn is_critical(&self) -> bool {
        matches!(self, AgentKind::Technical)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AgentKind {
    type Err = VoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        AgentKind::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| VoteError::UnknownAgent(s.to_string()))
    }
}

/// Reasons a vote is malformed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VoteError {
    #[error("unknown agent '{0}'")]
    UnknownAgent(String),
    #[error("{agent}: score {score} outside [-1, 1]")]
    ScoreOutOfRange { agent: AgentKind, score: f64 },
    #[error("{agent}: confidence {confidence} outside [0, 1]")]
    ConfidenceOutOfRange { agent: AgentKind, confidence: f64 },
    #[error("malformed vote: {0}")]
    Malformed(String),
}

/// An agent's opinion for one pair in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub agent: AgentKind,
    pub pair: String,
    /// Directional score in [-1, 1].
    pub score: f64,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub inputs_fresh: bool,
    pub explanation: String,
}

impl Vote {
    pub fn new(
        agent: AgentKind,
        pair: impl Into<String>,
        score: f64,
        confidence: f64,
        inputs_fresh: bool,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            agent,
            pair: pair.into(),
            score,
            confidence,
            inputs_fresh,
            explanation: explanation.into(),
        }
    }

    /// Neutral vote used when an agent cannot form an opinion.
    pub fn neutral(
        agent: AgentKind,
        pair: impl Into<String>,
        confidence: f64,
        inputs_fresh: bool,
        explanation: impl Into<String>,
    ) -> Self {
        Self::new(agent, pair, 0.0, confidence, inputs_fresh, explanation)
    }

    pub fn validate(&self) -> Result<(), VoteError> {
        if !self.score.is_finite() || !(-1.0..=1.0).contains(&self.score) {
            return Err(VoteError::ScoreOutOfRange {
                agent: self.agent,
                score: self.score,
            });
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(VoteError::ConfidenceOutOfRange {
                agent: self.agent,
                confidence: self.confidence,
            });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Parse and validate a vote from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, VoteError> {
        let vote: Vote =
            serde_json::from_str(json).map_err(|e| VoteError::Malformed(e.to_string()))?;
        vote.validate()?;
        Ok(vote)
    }
}
