//! Live decision cycle: one batch pass over the configured pairs.
//!
//! Per pair: judge candle freshness, collect votes, decide, gate by
//! `score_min` and the daily limits, then open a paper trade. Every decision
//! is appended to `decisions.jsonl` in the journal directory, whatever the
//! action. Open trades are reconciled against the same candles first.

use chrono::{DateTime, Utc};
use quorum_core::agents::{
    collect_votes, ResearchAgent, ResearchConfig, SnapshotAgent, TechnicalAgent, VoteProducer,
};
use quorum_core::consensus::{decide, SCORE_EPSILON};
use quorum_core::domain::{
    AgentContribution, Candle, ConsensusDecision, Direction, OpenTradeRecord,
};
use quorum_core::orders::compute_order_levels;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::QuorumConfig;
use crate::journal::{append_jsonl, JournalError};
use crate::lifecycle::{NewTrade, ReconcileSummary, TradeLifecycle};
use crate::limits::{DailyRiskStore, RiskLimits, RiskStateError};

pub const DECISIONS_FILE: &str = "decisions.jsonl";

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error(transparent)]
    RiskState(#[from] RiskStateError),
}

/// Candles for one pair, oldest first.
#[derive(Debug, Clone)]
pub struct PairInput {
    pub pair: String,
    pub candles: Vec<Candle>,
}

impl PairInput {
    pub fn new(pair: impl Into<String>, candles: Vec<Candle>) -> Self {
        Self {
            pair: pair.into(),
            candles,
        }
    }
}

/// What the cycle did with a pair's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleAction {
    Hold,
    BelowScoreMin,
    Blocked { reason: String },
    PaperDisabled,
    InvalidLevels { reason: String },
    Opened { trade: OpenTradeRecord },
}

impl CycleAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hold => "hold",
            Self::BelowScoreMin => "below_score_min",
            Self::Blocked { .. } => "blocked",
            Self::PaperDisabled => "paper_disabled",
            Self::InvalidLevels { .. } => "invalid_levels",
            Self::Opened { .. } => "opened",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PairReport {
    pub decision: ConsensusDecision,
    pub inputs_fresh: bool,
    pub action: CycleAction,
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub reconciled: ReconcileSummary,
    pub pairs: Vec<PairReport>,
}

impl CycleReport {
    pub fn opened(&self) -> impl Iterator<Item = &OpenTradeRecord> {
        self.pairs.iter().filter_map(|p| match &p.action {
            CycleAction::Opened { trade } => Some(trade),
            _ => None,
        })
    }
}

/// One line of `decisions.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub ts: DateTime<Utc>,
    pub pair: String,
    pub score: f64,
    pub decision: Direction,
    pub reason: String,
    pub breakdown: Vec<AgentContribution>,
    pub fused_bias: Direction,
    pub inputs_fresh: bool,
    pub action: String,
}

impl DecisionRecord {
    fn new(ts: DateTime<Utc>, report: &PairReport) -> Self {
        let d = &report.decision;
        Self {
            ts,
            pair: d.pair.clone(),
            score: d.score,
            decision: d.decision,
            reason: d.reason.clone(),
            breakdown: d.breakdown.clone(),
            fused_bias: d.fused_bias,
            inputs_fresh: report.inputs_fresh,
            action: report.action.label().to_string(),
        }
    }
}

/// External producers enabled by `[live]`.
pub fn default_producers(config: &QuorumConfig, now: DateTime<Utc>) -> Vec<Box<dyn VoteProducer>> {
    let live = &config.live;
    let now = now.timestamp();
    let mut producers: Vec<Box<dyn VoteProducer>> = Vec::new();
    if live.use_news {
        producers.push(Box::new(
            SnapshotAgent::news(&live.snapshot_dir, now).with_max_age(live.snapshot_max_age_secs),
        ));
    }
    if live.use_sentiment {
        producers.push(Box::new(
            SnapshotAgent::sentiment(&live.snapshot_dir, now)
                .with_max_age(live.snapshot_max_age_secs),
        ));
    }
    if live.use_research {
        producers.push(Box::new(ResearchAgent::new(ResearchConfig::default())));
    }
    producers
}

fn candles_fresh(candles: &[Candle], now: i64, max_age_secs: i64) -> bool {
    candles
        .last()
        .is_some_and(|last| now - last.t <= max_age_secs)
}

pub fn decisions_path(lifecycle: &TradeLifecycle) -> PathBuf {
    lifecycle.journal().dir().join(DECISIONS_FILE)
}

/// Run one cycle over `inputs`.
///
/// A pair with no usable candles is reported as HOLD; only journal and
/// risk-state I/O failures abort the cycle.
pub fn run_cycle(
    inputs: &[PairInput],
    producers: &[Box<dyn VoteProducer>],
    config: &QuorumConfig,
    lifecycle: &mut TradeLifecycle,
    risk_store: &DailyRiskStore,
    now: DateTime<Utc>,
) -> Result<CycleReport, CycleError> {
    let live = &config.live;
    let technical = TechnicalAgent::new(config.technical.clone());
    let limits = RiskLimits::from(&config.risk);
    let assumed_r = config.risk.assumed_r_per_trade;
    let today = now.date_naive();
    let log_path = decisions_path(lifecycle);

    let by_pair: HashMap<String, Vec<Candle>> = inputs
        .iter()
        .filter(|i| !i.candles.is_empty())
        .map(|i| (i.pair.clone(), i.candles.clone()))
        .collect();
    let reconciled = lifecycle.reconcile(&by_pair)?;

    let mut report = CycleReport {
        reconciled,
        pairs: Vec::with_capacity(inputs.len()),
    };

    for input in inputs {
        let pair = input.pair.as_str();
        let start = input.candles.len().saturating_sub(config.backtest.window);
        let window = &input.candles[start..];
        let fresh = candles_fresh(window, now.timestamp(), live.max_input_age_secs);
        if window.is_empty() {
            tracing::warn!(pair, "no candles, holding");
        }

        let mut votes = vec![technical.run(pair, window, fresh)];
        votes.extend(collect_votes(pair, window, fresh, producers));
        let decision = decide(
            pair,
            &votes,
            &config.consensus.thresholds,
            &config.consensus.weights,
        );

        let action = match decision.side() {
            None => CycleAction::Hold,
            Some(_) if decision.score.abs() < live.score_min - SCORE_EPSILON => {
                CycleAction::BelowScoreMin
            }
            Some(_) if !live.paper_enabled => CycleAction::PaperDisabled,
            Some(side) => {
                let check = risk_store.check_trading_limits(&limits, assumed_r, today);
                if !check.allowed {
                    tracing::info!(pair, reason = %check.reason, "trade blocked by daily limits");
                    CycleAction::Blocked {
                        reason: check.reason,
                    }
                } else {
                    let price = window.last().map(|c| c.c).unwrap_or(f64::NAN);
                    match compute_order_levels(
                        side,
                        price,
                        config.orders.risk_pct,
                        config.orders.rr,
                        config.orders.sl_distance_pct,
                    ) {
                        Ok(levels) => {
                            tracing::debug!(
                                pair,
                                entry = levels.entry,
                                risk_distance = levels.risk_distance(),
                                "order levels"
                            );
                            let meta = serde_json::json!({
                                "score": decision.score,
                                "reason": decision.reason,
                                "breakdown": decision.breakdown,
                            });
                            let trade =
                                NewTrade::from_levels(pair, &levels, config.orders.size, meta);
                            let record = lifecycle.open(trade, now)?;
                            risk_store.update_after_trade(assumed_r, today)?;
                            CycleAction::Opened { trade: record }
                        }
                        Err(e) => {
                            tracing::warn!(pair, error = %e, "cannot compute order levels");
                            CycleAction::InvalidLevels {
                                reason: e.to_string(),
                            }
                        }
                    }
                }
            }
        };

        tracing::debug!(
            pair,
            score = decision.score,
            decision = %decision.decision,
            reason = %decision.reason,
            action = action.label(),
            "cycle decision"
        );
        let pair_report = PairReport {
            decision,
            inputs_fresh: fresh,
            action,
        };
        append_jsonl(&log_path, &DecisionRecord::new(now, &pair_report))?;
        report.pairs.push(pair_report);
    }

    tracing::info!(
        pairs = report.pairs.len(),
        opened = report.opened().count(),
        closed = report.reconciled.closed.len(),
        "cycle finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::read_jsonl;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    /// Rising series whose last candle closes just before `now`.
    fn ramp(n: usize) -> Vec<Candle> {
        let end = now().timestamp() - 60;
        (0..n)
            .map(|i| {
                let c = 100.0 + i as f64;
                let t = end - (n - 1 - i) as i64 * 900;
                Candle::new(t, c, c + 0.5, c - 0.5, c, 1.0)
            })
            .collect()
    }

    fn setup(dir: &TempDir) -> (QuorumConfig, TradeLifecycle, DailyRiskStore) {
        let mut config = QuorumConfig::default();
        config.consensus.thresholds.driver_long = 0.6;
        config.live.use_news = false;
        config.live.use_sentiment = false;
        let lifecycle = TradeLifecycle::open_dir(&dir.path().join("journal")).unwrap();
        let store = DailyRiskStore::new(dir.path().join("risk.json"));
        (config, lifecycle, store)
    }

    #[test]
    fn fresh_uptrend_opens_one_trade_and_counts_it() {
        let dir = TempDir::new().unwrap();
        let (config, mut lifecycle, store) = setup(&dir);
        let inputs = vec![PairInput::new("BTCUSDT", ramp(300))];

        let report = run_cycle(&inputs, &[], &config, &mut lifecycle, &store, now()).unwrap();
        assert_eq!(report.pairs.len(), 1);
        let opened: Vec<_> = report.opened().collect();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].meta["reason"], "technical driver, no veto");
        assert_eq!(opened[0].entry, 399.0);

        let state = store.load(now().date_naive());
        assert_eq!(state.trades_opened_count, 1);
        assert_eq!(lifecycle.journal().read_open().unwrap().len(), 1);

        let (decisions, skipped): (Vec<DecisionRecord>, usize) =
            read_jsonl(&decisions_path(&lifecycle)).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].action, "opened");
    }

    #[test]
    fn daily_cap_blocks_second_cycle() {
        let dir = TempDir::new().unwrap();
        let (mut config, mut lifecycle, store) = setup(&dir);
        config.risk.max_trades_per_day = 1;
        let inputs = vec![PairInput::new("BTCUSDT", ramp(300))];

        run_cycle(&inputs, &[], &config, &mut lifecycle, &store, now()).unwrap();
        let second = run_cycle(&inputs, &[], &config, &mut lifecycle, &store, now()).unwrap();
        match &second.pairs[0].action {
            CycleAction::Blocked { reason } => {
                assert!(reason.starts_with("max_trades_per_day reached"));
            }
            other => panic!("expected blocked, got {other:?}"),
        }
        assert_eq!(store.load(now().date_naive()).trades_opened_count, 1);
    }

    #[test]
    fn empty_and_stale_pairs_hold_without_aborting() {
        let dir = TempDir::new().unwrap();
        let (config, mut lifecycle, store) = setup(&dir);
        let mut stale = ramp(300);
        for c in &mut stale {
            c.t -= 86_400;
        }
        let inputs = vec![
            PairInput::new("EMPTY", Vec::new()),
            PairInput::new("STALE", stale),
        ];

        let report = run_cycle(&inputs, &[], &config, &mut lifecycle, &store, now()).unwrap();
        assert_eq!(report.pairs.len(), 2);
        for p in &report.pairs {
            assert_eq!(p.decision.decision, Direction::Hold);
            assert_eq!(p.decision.reason, "critical stale: technical");
            assert_eq!(p.action, CycleAction::Hold);
            assert!(!p.inputs_fresh);
        }
        assert_eq!(report.opened().count(), 0);
    }

    #[test]
    fn score_min_gate_skips_trade() {
        let dir = TempDir::new().unwrap();
        let (mut config, mut lifecycle, store) = setup(&dir);
        config.live.score_min = 0.9;
        let inputs = vec![PairInput::new("BTCUSDT", ramp(300))];

        let report = run_cycle(&inputs, &[], &config, &mut lifecycle, &store, now()).unwrap();
        assert_eq!(report.pairs[0].action, CycleAction::BelowScoreMin);
        assert_eq!(store.load(now().date_naive()).trades_opened_count, 0);
    }
}
