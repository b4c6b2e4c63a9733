//! Backtest artifacts: trade tape (JSONL + CSV) and a run summary.
//!
//! `summary.json` carries a `schema_version`; newer versions are rejected on
//! load. Artifact directories are named from the pair and the parameter
//! fingerprint, so re-running identical inputs overwrites the same files.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use quorum_core::domain::{ClosedTradeRecord, TradeStatus};
use serde::{Deserialize, Serialize};

use crate::backtest::{BacktestParams, BacktestStats, BacktestTrade, SignalCounts};
use crate::metrics::RStats;

pub const SCHEMA_VERSION: u32 = 1;

pub const TRADES_JSONL: &str = "trades.jsonl";
pub const TRADES_CSV: &str = "trades.csv";
pub const SUMMARY_JSON: &str = "summary.json";

/// Content hash of the backtest parameters.
pub fn params_fingerprint(params: &BacktestParams) -> String {
    // Plain structs only, so serialization cannot fail.
    let json = serde_json::to_string(params).unwrap_or_default();
    blake3::hash(json.as_bytes()).to_hex().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub schema_version: u32,
    pub pair: String,
    pub params_fingerprint: String,
    pub dataset_hash: String,
    pub is_synthetic: bool,
    pub candles: usize,

    // ── Aggregates ──
    pub n_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub winrate: Option<f64>,
    pub profit_factor: Option<f64>,
    pub expectancy: Option<f64>,
    pub total_r: f64,
    pub max_drawdown_r: f64,
    pub signals: SignalCounts,
    pub long_stats: RStats,
    pub short_stats: RStats,
    pub open_at_end: bool,

    pub params: BacktestParams,
}

impl BacktestSummary {
    pub fn new(
        stats: &BacktestStats,
        params: &BacktestParams,
        dataset_hash: &str,
        is_synthetic: bool,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            pair: stats.pair.clone(),
            params_fingerprint: params_fingerprint(params),
            dataset_hash: dataset_hash.to_string(),
            is_synthetic,
            candles: stats.candles,
            n_trades: stats.n_trades,
            wins: stats.wins,
            losses: stats.losses,
            winrate: stats.winrate,
            profit_factor: stats.profit_factor,
            expectancy: stats.expectancy,
            total_r: stats.total_r,
            max_drawdown_r: stats.max_drawdown_r,
            signals: stats.signals,
            long_stats: stats.long_stats.clone(),
            short_stats: stats.short_stats.clone(),
            open_at_end: stats.open_at_end.is_some(),
            params: params.clone(),
        }
    }
}

fn candle_time(t: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(t, 0)
        .single()
        .with_context(|| format!("candle timestamp out of range: {t}"))
}

/// A simulated trade in the CLOSED journal shape, tagged `meta.source = "backtest"`.
pub fn trade_record(trade: &BacktestTrade) -> Result<ClosedTradeRecord> {
    Ok(ClosedTradeRecord {
        pair: trade.pair.clone(),
        side: trade.side,
        entry: trade.entry,
        stop_loss: trade.stop_loss,
        take_profit: trade.take_profit,
        size: 1.0,
        open_time: candle_time(trade.entry_t)?,
        exit_time: candle_time(trade.exit_t)?,
        exit: trade.exit,
        outcome: trade.outcome,
        pnl_r: trade.pnl_r,
        status: TradeStatus::Closed,
        meta: serde_json::json!({
            "source": "backtest",
            "entry_idx": trade.entry_idx,
            "exit_idx": trade.exit_idx,
            "entry_score": trade.entry_score,
        }),
    })
}

pub fn export_trades_jsonl(trades: &[BacktestTrade]) -> Result<String> {
    let mut out = String::new();
    for trade in trades {
        let line = serde_json::to_string(&trade_record(trade)?)
            .context("failed to serialize trade record")?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Columns: pair, side, entry_idx, entry_t, entry, stop_loss, take_profit,
/// entry_score, exit_idx, exit_t, exit, outcome, pnl_r, bars_held
pub fn export_trades_csv(trades: &[BacktestTrade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "pair",
        "side",
        "entry_idx",
        "entry_t",
        "entry",
        "stop_loss",
        "take_profit",
        "entry_score",
        "exit_idx",
        "exit_t",
        "exit",
        "outcome",
        "pnl_r",
        "bars_held",
    ])?;
    for t in trades {
        wtr.write_record([
            t.pair.clone(),
            t.side.to_string(),
            t.entry_idx.to_string(),
            t.entry_t.to_string(),
            t.entry.to_string(),
            t.stop_loss.to_string(),
            t.take_profit.to_string(),
            format!("{:.4}", t.entry_score),
            t.exit_idx.to_string(),
            t.exit_t.to_string(),
            t.exit.to_string(),
            t.outcome.as_str().to_string(),
            t.pnl_r.to_string(),
            t.bars_held().to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write `trades.jsonl`, `trades.csv` and `summary.json` under
/// `{output_dir}/{pair}_{fingerprint prefix}/` and return that directory.
pub fn save_backtest_artifacts(
    stats: &BacktestStats,
    params: &BacktestParams,
    dataset_hash: &str,
    is_synthetic: bool,
    output_dir: &Path,
) -> Result<PathBuf> {
    let summary = BacktestSummary::new(stats, params, dataset_hash, is_synthetic);
    let short_fp = &summary.params_fingerprint[..12];
    let run_dir = output_dir.join(format!("{}_{short_fp}", stats.pair));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let write = |name: &str, body: &str| -> Result<()> {
        let path = run_dir.join(name);
        std::fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))
    };
    write(TRADES_JSONL, &export_trades_jsonl(&stats.trades)?)?;
    write(TRADES_CSV, &export_trades_csv(&stats.trades)?)?;
    let json = serde_json::to_string_pretty(&summary).context("failed to serialize summary")?;
    write(SUMMARY_JSON, &json)?;

    tracing::info!(dir = %run_dir.display(), trades = stats.n_trades, "artifacts written");
    Ok(run_dir)
}

/// Load `summary.json` from an artifact directory, rejecting newer schemas.
pub fn load_summary(dir: &Path) -> Result<BacktestSummary> {
    let path = dir.join(SUMMARY_JSON);
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let summary: BacktestSummary =
        serde_json::from_str(&json).context("failed to deserialize summary")?;
    if summary.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            summary.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(summary)
}
