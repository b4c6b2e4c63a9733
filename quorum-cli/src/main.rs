//! Quorum CLI — backtest, sweep, live cycle and paper-trade commands.
//!
//! Commands:
//! - `backtest` — replay the decision pipeline over a candle CSV (or a synthetic series)
//! - `sweep` — backtest a grid of score gates and technical triggers, write CSV
//! - `run` — one live decision cycle over the configured pairs
//! - `close` — manually close the latest open paper trade for a pair
//! - `limits` — show today's daily risk counters and the gate result

mod obs;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use quorum_core::domain::{Outcome, Side};
use quorum_runner::backtest::{simulate, BacktestParams, BacktestStats};
use quorum_runner::cycle::{default_producers, run_cycle, CycleAction, PairInput};
use quorum_runner::data_loader::{load_candles, synthetic_candles, LoadError, LoadedCandles};
use quorum_runner::export::save_backtest_artifacts;
use quorum_runner::lifecycle::{CloseRequest, CloseResult, TradeLifecycle};
use quorum_runner::limits::{DailyRiskStore, RiskLimits};
use quorum_runner::sweep::{best_by_expectancy, run_sweep, write_sweep_csv, SweepGrid};
use quorum_runner::QuorumConfig;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "quorum", about = "Quorum CLI — multi-agent consensus signals and backtests")]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (overridden by QUORUM_LOG).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log format: text or json.
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct DataArgs {
    /// Trading pair, e.g. BTCUSDT.
    #[arg(long, default_value = "BTCUSDT")]
    pair: String,

    /// Candle CSV file.
    #[arg(long, conflicts_with = "synthetic")]
    data: Option<PathBuf>,

    /// Use a seeded synthetic series instead of a CSV file.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Seed for the synthetic series.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Length of the synthetic series.
    #[arg(long, default_value_t = 2_000)]
    candles: usize,
}

#[derive(Args, Clone, Default)]
struct ParamOverrides {
    /// Minimum |S| to open a trade.
    #[arg(long)]
    score_min: Option<f64>,

    /// Reward-to-risk ratio.
    #[arg(long)]
    rr: Option<f64>,

    /// Stop distance as a fraction of price.
    #[arg(long)]
    sl_distance_pct: Option<f64>,

    /// Trailing window length.
    #[arg(long)]
    window: Option<usize>,
}

impl ParamOverrides {
    fn apply(&self, mut params: BacktestParams) -> BacktestParams {
        if let Some(v) = self.score_min {
            params.score_min = v;
        }
        if let Some(v) = self.rr {
            params.rr = v;
        }
        if let Some(v) = self.sl_distance_pct {
            params.sl_distance_pct = v;
        }
        if let Some(v) = self.window {
            params.window = v;
        }
        params
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the decision pipeline and write trade artifacts.
    Backtest {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        overrides: ParamOverrides,

        /// Artifact directory. Defaults to `backtest.output_dir`.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Backtest a grid of score gates and technical triggers.
    Sweep {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        overrides: ParamOverrides,

        /// Comma-separated score_min values.
        #[arg(long, value_delimiter = ',', default_values_t = vec![0.0, 0.2, 0.4])]
        score_mins: Vec<f64>,

        /// Comma-separated symmetric driver thresholds (long = t, short = -t).
        #[arg(long, value_delimiter = ',', default_values_t = vec![0.6, 0.7, 0.8])]
        triggers: Vec<f64>,

        /// Output CSV path.
        #[arg(long, default_value = "artifacts/sweep.csv")]
        output: PathBuf,
    },
    /// Run one live decision cycle over `live.pairs`.
    Run,
    /// Manually close the latest open paper trade for a pair.
    Close {
        #[arg(long)]
        pair: String,

        /// Only consider trades on this side (LONG or SHORT).
        #[arg(long)]
        side: Option<Side>,

        #[arg(long)]
        exit_price: f64,

        /// Outcome label: TP, SL, MANUAL or UNKNOWN.
        #[arg(long, default_value = "MANUAL")]
        outcome: Outcome,
    },
    /// Show today's risk counters and whether one more trade fits.
    Limits,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    obs::init_tracing(&cli.log_level, &cli.log_format)?;
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Backtest {
            data,
            overrides,
            output_dir,
        } => run_backtest_cmd(&config, &data, &overrides, output_dir),
        Commands::Sweep {
            data,
            overrides,
            score_mins,
            triggers,
            output,
        } => run_sweep_cmd(&config, &data, &overrides, score_mins, triggers, &output),
        Commands::Run => run_live_cmd(&config),
        Commands::Close {
            pair,
            side,
            exit_price,
            outcome,
        } => run_close_cmd(&config, &pair, side, exit_price, outcome),
        Commands::Limits => run_limits_cmd(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<QuorumConfig> {
    match path {
        Some(path) => Ok(QuorumConfig::from_file(path)?),
        None => Ok(QuorumConfig::default()),
    }
}

fn load_data(data: &DataArgs) -> Result<LoadedCandles> {
    if data.synthetic {
        return Ok(synthetic_candles(
            &data.pair,
            data.seed,
            data.candles,
            1_700_000_000,
            900,
        ));
    }
    let Some(path) = &data.data else {
        bail!("one of --data or --synthetic is required");
    };
    let loaded = load_candles(path)?;
    if loaded.skipped_rows > 0 {
        tracing::warn!(
            skipped = loaded.skipped_rows,
            path = %path.display(),
            "skipped malformed rows"
        );
    }
    Ok(loaded)
}

fn run_backtest_cmd(
    config: &QuorumConfig,
    data: &DataArgs,
    overrides: &ParamOverrides,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let loaded = load_data(data)?;
    let params = overrides.apply(BacktestParams::from_config(config));
    params.validate().context("invalid backtest parameters")?;
    let stats = simulate(&data.pair, &loaded.candles, &params);
    print_summary(&stats, loaded.is_synthetic);

    let output_dir = output_dir.unwrap_or_else(|| config.backtest.output_dir.clone());
    let run_dir = save_backtest_artifacts(
        &stats,
        &params,
        &loaded.dataset_hash,
        loaded.is_synthetic,
        &output_dir,
    )?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn run_sweep_cmd(
    config: &QuorumConfig,
    data: &DataArgs,
    overrides: &ParamOverrides,
    score_mins: Vec<f64>,
    triggers: Vec<f64>,
    output: &Path,
) -> Result<()> {
    let loaded = load_data(data)?;
    let base = overrides.apply(BacktestParams::from_config(config));
    base.validate().context("invalid backtest parameters")?;
    let grid = SweepGrid {
        score_mins,
        drivers: triggers.iter().map(|t| (*t, -*t)).collect(),
    };
    let rows = run_sweep(&data.pair, &loaded.candles, &base, &grid);
    write_sweep_csv(output, &rows)?;

    println!("Sweep: {} cells → {}", rows.len(), output.display());
    if let Some(best) = best_by_expectancy(&rows) {
        println!(
            "Best expectancy: {:.3}R (score_min={}, driver={}/{}, trades={})",
            best.expectancy.unwrap_or_default(),
            best.score_min,
            best.driver_long,
            best.driver_short,
            best.n_trades
        );
    }
    Ok(())
}

fn run_live_cmd(config: &QuorumConfig) -> Result<()> {
    let now = Utc::now();
    let mut inputs = Vec::with_capacity(config.live.pairs.len());
    for pair in &config.live.pairs {
        let path = config.live.candle_path(pair);
        let candles = match load_candles(&path) {
            Ok(loaded) => loaded.candles,
            Err(e @ (LoadError::Missing(_) | LoadError::Empty { .. })) => {
                tracing::warn!(pair = %pair, error = %e, "no candles for pair");
                Vec::new()
            }
            Err(e) => return Err(e).with_context(|| format!("loading candles for {pair}")),
        };
        inputs.push(PairInput::new(pair.clone(), candles));
    }

    let producers = default_producers(config, now);
    let mut lifecycle = TradeLifecycle::open_dir(&config.journal.dir)?;
    let risk_store = DailyRiskStore::new(&config.risk.state_file);
    let report = run_cycle(&inputs, &producers, config, &mut lifecycle, &risk_store, now)?;

    for closed in &report.reconciled.closed {
        println!(
            "closed  {} {} {} @ {} ({:+.2}R, {})",
            closed.pair,
            closed.side,
            closed.outcome.as_str(),
            closed.exit,
            closed.pnl_r,
            if closed.is_winner() { "win" } else { "loss" }
        );
    }
    for p in &report.pairs {
        println!("{}", serde_json::to_string(&p.decision)?);
        match &p.action {
            CycleAction::Opened { trade } => println!(
                "opened  {} {} entry={} sl={} tp={}",
                trade.pair, trade.side, trade.entry, trade.stop_loss, trade.take_profit
            ),
            CycleAction::Blocked { reason } => println!("blocked {}: {reason}", p.decision.pair),
            _ => {}
        }
    }
    Ok(())
}

fn run_close_cmd(
    config: &QuorumConfig,
    pair: &str,
    side: Option<Side>,
    exit_price: f64,
    outcome: Outcome,
) -> Result<()> {
    let mut lifecycle = TradeLifecycle::open_dir(&config.journal.dir)?;
    let open = lifecycle
        .journal()
        .unclosed()?
        .into_iter()
        .filter(|r| r.pair == pair && side.map_or(true, |s| r.side == s))
        .max_by_key(|r| r.t);
    let Some(open) = open else {
        bail!("no open trade for {pair}");
    };

    match lifecycle.close(CloseRequest::for_open(&open, exit_price, outcome, Utc::now()))? {
        CloseResult::Closed(record) => println!(
            "closed {} {} @ {} ({:+.2}R)",
            record.pair, record.side, record.exit, record.pnl_r
        ),
        CloseResult::AlreadyClosed => println!("already closed"),
    }
    Ok(())
}

fn run_limits_cmd(config: &QuorumConfig) -> Result<()> {
    let today = Utc::now().date_naive();
    let store = DailyRiskStore::new(&config.risk.state_file);
    let state = store.load(today);
    let check = store.check_trading_limits(
        &RiskLimits::from(&config.risk),
        config.risk.assumed_r_per_trade,
        today,
    );
    println!("date:         {}", state.date);
    println!("trades today: {}", state.trades_opened_count);
    println!("risk used:    {:.2}R", state.risk_used_r);
    println!("allowed:      {} ({})", check.allowed, check.reason);
    Ok(())
}

fn fmt_opt(value: Option<f64>, digits: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.digits$}"))
}

fn print_summary(stats: &BacktestStats, synthetic: bool) {
    println!();
    println!("=== Backtest: {} ===", stats.pair);
    if synthetic {
        println!("  Data:          SYNTHETIC");
    }
    println!("  Candles:       {}", stats.candles);
    println!(
        "  Signals:       L={} S={} H={}",
        stats.signals.long, stats.signals.short, stats.signals.hold
    );
    println!(
        "  Trades:        {} ({} wins / {} losses)",
        stats.n_trades, stats.wins, stats.losses
    );
    println!("  Win rate:      {}", fmt_opt(stats.winrate, 3));
    println!("  Profit factor: {}", fmt_opt(stats.profit_factor, 2));
    println!("  Expectancy:    {}R", fmt_opt(stats.expectancy, 3));
    println!("  Total:         {:+.2}R", stats.total_r);
    println!("  Max drawdown:  {:.2}R", stats.max_drawdown_r);
    println!(
        "  Long / Short:  {} / {}",
        stats.long_stats.n_trades, stats.short_stats.n_trades
    );
    if let Some(open) = &stats.open_at_end {
        println!("  Open at end:   {} from candle {}", open.side, open.entry_idx);
    }
    println!();
}
