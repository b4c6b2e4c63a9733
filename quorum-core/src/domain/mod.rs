//! Domain types shared by the scoring, consensus and trade components.

pub mod candle;
pub mod decision;
pub mod side;
pub mod trade;
pub mod vote;

pub use candle::Candle;
pub use decision::{AgentContribution, ConsensusDecision};
pub use side::{Direction, Side, SideParseError};
pub use trade::{realized_r, ClosedTradeRecord, OpenTradeRecord, Outcome, TradeKey, TradeStatus};
pub use vote::{AgentKind, Vote, VoteError};

/// Trading pair identifier (e.g. "BTCUSDT").
pub type Pair = String;
