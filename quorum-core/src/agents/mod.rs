//! Scoring agents and the vote-producer seam.
//!
//! Every agent is a [`VoteProducer`] tagged with a closed [`AgentKind`].
//! The technical agent is pure and never fails; external agents may degrade,
//! in which case [`collect_votes`] logs the failure and carries on with the
//! remaining producers.

pub mod research;
pub mod snapshot;
pub mod technical;

pub use research::{ResearchAgent, ResearchConfig};
pub use snapshot::{NewsSnapshot, SentimentSnapshot, SnapshotAgent};
pub use technical::{TechnicalAgent, TechnicalConfig, VolatilityRegime};

use crate::domain::{AgentKind, Candle, Vote, VoteError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{agent} agent degraded: {reason}")]
    Degraded { agent: AgentKind, reason: String },

    #[error("{agent} agent produced an invalid vote: {source}")]
    InvalidVote {
        agent: AgentKind,
        #[source]
        source: VoteError,
    },
}

impl AgentError {
    pub fn degraded(agent: AgentKind, reason: impl Into<String>) -> Self {
        AgentError::Degraded {
            agent,
            reason: reason.into(),
        }
    }

    pub fn agent(&self) -> AgentKind {
        match self {
            AgentError::Degraded { agent, .. } | AgentError::InvalidVote { agent, .. } => *agent,
        }
    }
}

/// Anything that can cast a vote for a pair.
pub trait VoteProducer: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// Produce a vote from the trailing candle window.
    ///
    /// `inputs_fresh` reports whether the window itself is recent; producers
    /// with their own data source may determine freshness independently.
    fn vote(&self, pair: &str, window: &[Candle], inputs_fresh: bool) -> Result<Vote, AgentError>;
}

/// Run each producer once, in order, keeping only valid votes.
///
/// A failing producer is logged and skipped; it never prevents the others
/// from voting.
pub fn collect_votes(
    pair: &str,
    window: &[Candle],
    inputs_fresh: bool,
    producers: &[Box<dyn VoteProducer>],
) -> Vec<Vote> {
    let mut votes = Vec::with_capacity(producers.len());
    for producer in producers {
        let result = producer.vote(pair, window, inputs_fresh).and_then(|vote| {
            vote.validate().map_err(|source| AgentError::InvalidVote {
                agent: vote.agent,
                source,
            })?;
            Ok(vote)
        });
        match result {
            Ok(vote) => votes.push(vote),
            Err(err) => {
                tracing::warn!(pair, agent = %producer.kind(), error = %err, "dropping vote");
            }
        }
    }
    votes
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(AgentKind, f64);

    impl VoteProducer for Fixed {
        fn kind(&self) -> AgentKind {
            self.0
        }
        fn vote(&self, pair: &str, _: &[Candle], fresh: bool) -> Result<Vote, AgentError> {
            Ok(Vote::new(self.0, pair, self.1, 0.8, fresh, "fixed"))
        }
    }

    struct Broken;

    impl VoteProducer for Broken {
        fn kind(&self) -> AgentKind {
            AgentKind::News
        }
        fn vote(&self, _: &str, _: &[Candle], _: bool) -> Result<Vote, AgentError> {
            Err(AgentError::degraded(AgentKind::News, "provider timeout"))
        }
    }

    #[test]
    fn failing_producer_is_dropped_not_fatal() {
        let producers: Vec<Box<dyn VoteProducer>> = vec![
            Box::new(Fixed(AgentKind::Technical, 0.7)),
            Box::new(Broken),
            Box::new(Fixed(AgentKind::Sentiment, -0.2)),
        ];
        let votes = collect_votes("BTCUSDT", &[], true, &producers);
        let kinds: Vec<AgentKind> = votes.iter().map(|v| v.agent).collect();
        assert_eq!(kinds, vec![AgentKind::Technical, AgentKind::Sentiment]);
    }

    #[test]
    fn invalid_vote_is_dropped() {
        let producers: Vec<Box<dyn VoteProducer>> = vec![
            Box::new(Fixed(AgentKind::Research, 3.0)),
            Box::new(Fixed(AgentKind::Technical, 0.1)),
        ];
        let votes = collect_votes("BTCUSDT", &[], true, &producers);
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].agent, AgentKind::Technical);
    }

    #[test]
    fn error_reports_its_agent() {
        let err = AgentError::degraded(AgentKind::Sentiment, "bad json");
        assert_eq!(err.agent(), AgentKind::Sentiment);
        assert_eq!(err.to_string(), "sentiment agent degraded: bad json");
    }
}
