//! Quorum Core — scoring agents, consensus and order levels.
//!
//! This crate is pure and synchronous:
//! - Domain types (candles, votes, decisions, trade records)
//! - Indicator library (EMA, RSI, ATR)
//! - Technical, snapshot (news/sentiment) and research agents
//! - Consensus engine with critical gate and veto policy
//! - Order level calculator

pub mod agents;
pub mod consensus;
pub mod domain;
pub mod indicators;
pub mod orders;

pub use agents::{collect_votes, AgentError, TechnicalAgent, TechnicalConfig, VoteProducer};
pub use consensus::{decide, AgentWeights, Thresholds, SCORE_EPSILON};
pub use domain::{
    AgentContribution, AgentKind, Candle, ConsensusDecision, Direction, Outcome, Side, Vote,
};
pub use orders::{compute_order_levels, compute_order_levels_str, LevelsError, OrderLevels};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the types handed across the runner boundary are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Candle>();
        require_sync::<Candle>();
        require_send::<Vote>();
        require_sync::<Vote>();
        require_send::<ConsensusDecision>();
        require_sync::<ConsensusDecision>();
        require_send::<OrderLevels>();
        require_sync::<OrderLevels>();
        require_send::<domain::TradeKey>();
        require_sync::<domain::TradeKey>();
        require_send::<TechnicalAgent>();
        require_sync::<TechnicalAgent>();
        require_send::<agents::SnapshotAgent>();
        require_sync::<agents::SnapshotAgent>();
        require_send::<agents::ResearchAgent>();
        require_sync::<agents::ResearchAgent>();
    }

    /// The technical agent is usable through the vote-producer seam.
    #[test]
    fn technical_agent_is_a_vote_producer() {
        let producers: Vec<Box<dyn VoteProducer>> = vec![Box::new(TechnicalAgent::default())];
        let votes = collect_votes("BTCUSDT", &[], true, &producers);
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].agent, AgentKind::Technical);
        assert_eq!(votes[0].explanation, "insufficient history");
    }
}
