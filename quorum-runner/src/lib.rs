//! Quorum Runner — backtests, paper-trade lifecycle and the live cycle.
//!
//! This crate builds on `quorum-core` to provide:
//! - TOML configuration with validation and fingerprinting
//! - Candle CSV loading with a seeded synthetic fallback
//! - Append-only trade journals and the paper-trade lifecycle
//! - Daily risk gate persisted per UTC day
//! - Backtest simulation, threshold sweeps and artifact export
//! - One-shot live decision cycle

pub mod backtest;
pub mod config;
pub mod cycle;
pub mod data_loader;
pub mod export;
pub mod journal;
pub mod lifecycle;
pub mod limits;
pub mod metrics;
pub mod sweep;

pub use backtest::{
    simulate, BacktestParams, BacktestStats, BacktestTrade, OpenPosition, SignalCounts,
};
pub use config::{ConfigError, QuorumConfig};
pub use cycle::{run_cycle, CycleAction, CycleError, CycleReport, DecisionRecord, PairInput};
pub use data_loader::{load_candles, synthetic_candles, LoadError, LoadedCandles};
pub use export::{load_summary, save_backtest_artifacts, BacktestSummary, SCHEMA_VERSION};
pub use journal::{JournalError, TradeJournal};
pub use lifecycle::{CloseRequest, CloseResult, NewTrade, ReconcileSummary, TradeLifecycle};
pub use limits::{
    check_limits, DailyRiskState, DailyRiskStore, LimitCheck, RiskLimits, RiskStateError,
};
pub use metrics::RStats;
pub use sweep::{run_sweep, SweepGrid, SweepRow};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn backtest_types_are_send_sync() {
        assert_send::<BacktestParams>();
        assert_sync::<BacktestParams>();
        assert_send::<BacktestStats>();
        assert_sync::<BacktestStats>();
        assert_send::<SweepRow>();
        assert_sync::<SweepRow>();
    }

    #[test]
    fn config_is_send_sync() {
        assert_send::<QuorumConfig>();
        assert_sync::<QuorumConfig>();
    }

    #[test]
    fn lifecycle_is_send() {
        assert_send::<TradeLifecycle>();
        assert_send::<DailyRiskStore>();
        assert_sync::<DailyRiskStore>();
        assert_send::<CycleReport>();
    }
}
