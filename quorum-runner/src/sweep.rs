//! Threshold sweep: re-runs the backtest over a grid of entry gates.

use anyhow::{Context, Result};
use quorum_core::domain::Candle;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::backtest::{simulate, BacktestParams};

/// Grid of `score_min` values × technical trigger pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepGrid {
    pub score_mins: Vec<f64>,
    /// `(driver_long, driver_short)` pairs.
    pub drivers: Vec<(f64, f64)>,
}

impl Default for SweepGrid {
    fn default() -> Self {
        Self {
            score_mins: vec![0.0, 0.2, 0.4],
            drivers: vec![(0.6, -0.6), (0.7, -0.6), (0.8, -0.8)],
        }
    }
}

impl SweepGrid {
    /// Number of cells, counting only trigger pairs with `long > short`.
    pub fn size(&self) -> usize {
        self.score_mins.len() * self.drivers.iter().filter(|(l, s)| l > s).count()
    }

    /// All parameter sets in the grid, row-major over `score_mins`.
    pub fn generate(&self, base: &BacktestParams) -> Vec<BacktestParams> {
        let mut cells = Vec::with_capacity(self.size());
        for &score_min in &self.score_mins {
            for &(driver_long, driver_short) in &self.drivers {
                // Crossed triggers would propose both directions.
                if driver_long <= driver_short {
                    continue;
                }
                let mut params = base.clone();
                params.score_min = score_min;
                params.thresholds.driver_long = driver_long;
                params.thresholds.driver_short = driver_short;
                cells.push(params);
            }
        }
        cells
    }
}

/// One grid cell's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    pub pair: String,
    pub score_min: f64,
    pub driver_long: f64,
    pub driver_short: f64,
    pub n_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub winrate: Option<f64>,
    pub profit_factor: Option<f64>,
    pub expectancy: Option<f64>,
    pub total_r: f64,
    pub max_drawdown_r: f64,
}

pub fn run_sweep(
    pair: &str,
    candles: &[Candle],
    base: &BacktestParams,
    grid: &SweepGrid,
) -> Vec<SweepRow> {
    let rows: Vec<SweepRow> = grid
        .generate(base)
        .iter()
        .map(|params| {
            let stats = simulate(pair, candles, params);
            SweepRow {
                pair: pair.to_string(),
                score_min: params.score_min,
                driver_long: params.thresholds.driver_long,
                driver_short: params.thresholds.driver_short,
                n_trades: stats.n_trades,
                wins: stats.wins,
                losses: stats.losses,
                winrate: stats.winrate,
                profit_factor: stats.profit_factor,
                expectancy: stats.expectancy,
                total_r: stats.total_r,
                max_drawdown_r: stats.max_drawdown_r,
            }
        })
        .collect();
    tracing::info!(pair, cells = rows.len(), "sweep finished");
    rows
}

/// Row with the highest expectancy; rows without trades are ignored.
pub fn best_by_expectancy(rows: &[SweepRow]) -> Option<&SweepRow> {
    rows.iter()
        .filter_map(|r| r.expectancy.map(|e| (r, e)))
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(r, _)| r)
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.6}")).unwrap_or_default()
}

/// Sweep rows as CSV, one line per cell. Undefined ratios are empty.
pub fn sweep_to_csv(rows: &[SweepRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "pair",
        "score_min",
        "driver_long",
        "driver_short",
        "n_trades",
        "wins",
        "losses",
        "winrate",
        "profit_factor",
        "expectancy",
        "total_r",
        "max_drawdown_r",
    ])?;
    for r in rows {
        wtr.write_record([
            r.pair.clone(),
            r.score_min.to_string(),
            r.driver_long.to_string(),
            r.driver_short.to_string(),
            r.n_trades.to_string(),
            r.wins.to_string(),
            r.losses.to_string(),
            opt(r.winrate),
            opt(r.profit_factor),
            opt(r.expectancy),
            format!("{:.6}", r.total_r),
            format!("{:.6}", r.max_drawdown_r),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn write_sweep_csv(path: &Path, rows: &[SweepRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let csv = sweep_to_csv(rows)?;
    std::fs::write(path, csv).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_skips_crossed_triggers() {
        let grid = SweepGrid {
            score_mins: vec![0.0, 0.5],
            drivers: vec![(0.7, -0.6), (-0.2, 0.3)],
        };
        assert_eq!(grid.size(), 2);
        let cells = grid.generate(&BacktestParams::default());
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[1].score_min, 0.5);
        assert_eq!(cells[1].thresholds.driver_long, 0.7);
    }

    #[test]
    fn csv_has_header_and_one_line_per_row() {
        let row = SweepRow {
            pair: "BTCUSDT".into(),
            score_min: 0.2,
            driver_long: 0.7,
            driver_short: -0.6,
            n_trades: 0,
            wins: 0,
            losses: 0,
            winrate: None,
            profit_factor: None,
            expectancy: None,
            total_r: 0.0,
            max_drawdown_r: 0.0,
        };
        let csv = sweep_to_csv(&[row.clone(), row]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("pair,score_min,driver_long"));
        assert_eq!(lines[1], "BTCUSDT,0.2,0.7,-0.6,0,0,0,,,,0.000000,0.000000");
    }

    #[test]
    fn best_ignores_empty_cells() {
        let mk = |e: Option<f64>| SweepRow {
            pair: "X".into(),
            score_min: 0.0,
            driver_long: 0.7,
            driver_short: -0.6,
            n_trades: 1,
            wins: 0,
            losses: 0,
            winrate: None,
            profit_factor: None,
            expectancy: e,
            total_r: 0.0,
            max_drawdown_r: 0.0,
        };
        let rows = vec![mk(None), mk(Some(0.2)), mk(Some(-0.1))];
        assert_eq!(best_by_expectancy(&rows).and_then(|r| r.expectancy), Some(0.2));
        assert!(best_by_expectancy(&[mk(None)]).is_none());
    }
}
