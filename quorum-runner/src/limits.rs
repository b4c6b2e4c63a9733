//! Daily risk gate.
//!
//! The UTC day's counters live in a small JSON file. They are loaded around
//! each use and never held in process-wide state. A state from an earlier
//! day, a missing file or a corrupt file all load as a fresh zeroed state.

use crate::config::RiskConfig;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const LIMITS_OK: &str = "limits_ok";

#[derive(Debug, Error)]
pub enum RiskStateError {
    #[error("failed to write risk state {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode risk state: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRiskState {
    pub date: NaiveDate,
    #[serde(default, alias = "n_trades")]
    pub trades_opened_count: u32,
    #[serde(default)]
    pub risk_used_r: f64,
}

impl DailyRiskState {
    pub fn fresh(date: NaiveDate) -> Self {
        Self {
            date,
            trades_opened_count: 0,
            risk_used_r: 0.0,
        }
    }

    /// Record one accepted trade.
    pub fn record_trade(&mut self, assumed_r: f64) {
        self.trades_opened_count += 1;
        self.risk_used_r += assumed_r;
    }
}

/// Daily limits. A zero value disables the check.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_trades_per_day: u32,
    pub max_daily_risk_r: f64,
    pub max_risk_per_trade_r: f64,
}

impl From<&RiskConfig> for RiskLimits {
    fn from(config: &RiskConfig) -> Self {
        Self {
            max_trades_per_day: config.max_trades_per_day,
            max_daily_risk_r: config.max_daily_risk_r,
            max_risk_per_trade_r: config.max_risk_per_trade_r,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitCheck {
    pub allowed: bool,
    pub reason: String,
}

impl LimitCheck {
    fn ok() -> Self {
        Self {
            allowed: true,
            reason: LIMITS_OK.to_string(),
        }
    }

    fn blocked(reason: String) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Would one more trade of `assumed_r` fit today's limits?
///
/// Order: per-trade risk, then trade count, then cumulative daily R.
pub fn check_limits(state: &DailyRiskState, limits: &RiskLimits, assumed_r: f64) -> LimitCheck {
    if limits.max_risk_per_trade_r > 0.0 && assumed_r > limits.max_risk_per_trade_r {
        return LimitCheck::blocked(format!(
            "risk_per_trade_r {assumed_r:.2} > max_risk_per_trade_r {:.2}",
            limits.max_risk_per_trade_r
        ));
    }

    if limits.max_trades_per_day > 0 && state.trades_opened_count + 1 > limits.max_trades_per_day {
        return LimitCheck::blocked(format!(
            "max_trades_per_day reached: {} trades already opened today",
            state.trades_opened_count
        ));
    }

    if limits.max_daily_risk_r > 0.0 && state.risk_used_r + assumed_r > limits.max_daily_risk_r {
        return LimitCheck::blocked(format!(
            "max_daily_risk_r reached: {:.2}R used, limit {:.2}R",
            state.risk_used_r, limits.max_daily_risk_r
        ));
    }

    LimitCheck::ok()
}

/// File-backed store for [`DailyRiskState`].
#[derive(Debug, Clone)]
pub struct DailyRiskStore {
    path: PathBuf,
}

impl DailyRiskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load today's state, resetting on date change or unreadable state.
    pub fn load(&self, today: NaiveDate) -> DailyRiskState {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return DailyRiskState::fresh(today),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "risk state unreadable, resetting"
                );
                return DailyRiskState::fresh(today);
            }
        };

        match serde_json::from_str::<DailyRiskState>(&text) {
            Ok(state) if state.date == today => state,
            Ok(state) => {
                tracing::debug!(
                    previous = %state.date,
                    %today,
                    "new trading day, resetting risk state"
                );
                DailyRiskState::fresh(today)
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "risk state corrupt, resetting"
                );
                DailyRiskState::fresh(today)
            }
        }
    }

    /// Persist via write-then-rename so readers never see a torn file.
    pub fn save(&self, state: &DailyRiskState) -> Result<(), RiskStateError> {
        let io_err = |source| RiskStateError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let json = serde_json::to_string(state)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }

    /// Scoped read-modify-write of today's state.
    pub fn transact<T>(
        &self,
        today: NaiveDate,
        f: impl FnOnce(&mut DailyRiskState) -> T,
    ) -> Result<T, RiskStateError> {
        let mut state = self.load(today);
        let out = f(&mut state);
        self.save(&state)?;
        Ok(out)
    }

    pub fn check_trading_limits(
        &self,
        limits: &RiskLimits,
        assumed_r: f64,
        today: NaiveDate,
    ) -> LimitCheck {
        check_limits(&self.load(today), limits, assumed_r)
    }

    /// Count one accepted trade. Call exactly once per opened trade.
    pub fn update_after_trade(
        &self,
        assumed_r: f64,
        today: NaiveDate,
    ) -> Result<DailyRiskState, RiskStateError> {
        self.transact(today, |state| {
            state.record_trade(assumed_r);
            state.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    #[test]
    fn zero_limits_disable_checks() {
        let mut state = DailyRiskState::fresh(day(1));
        state.trades_opened_count = 100;
        state.risk_used_r = 100.0;
        let check = check_limits(&state, &RiskLimits::default(), 5.0);
        assert!(check.allowed);
        assert_eq!(check.reason, "limits_ok");
    }

    #[test]
    fn per_trade_check_comes_first() {
        let mut state = DailyRiskState::fresh(day(1));
        state.trades_opened_count = 10;
        let limits = RiskLimits {
            max_trades_per_day: 1,
            max_daily_risk_r: 1.0,
            max_risk_per_trade_r: 1.0,
        };
        let check = check_limits(&state, &limits, 1.5);
        assert!(!check.allowed);
        assert!(check.reason.starts_with("risk_per_trade_r"));
    }

    #[test]
    fn daily_risk_budget_blocks() {
        let mut state = DailyRiskState::fresh(day(1));
        state.risk_used_r = 2.5;
        let limits = RiskLimits {
            max_daily_risk_r: 3.0,
            ..RiskLimits::default()
        };
        let check = check_limits(&state, &limits, 1.0);
        assert!(!check.allowed);
        assert!(check.reason.starts_with("max_daily_risk_r reached"));
        assert!(check_limits(&state, &limits, 0.5).allowed);
    }

    #[test]
    fn corrupt_state_resets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{{{ not json").unwrap();
        let store = DailyRiskStore::new(&path);
        assert_eq!(store.load(day(2)), DailyRiskState::fresh(day(2)));
    }

    #[test]
    fn legacy_field_name_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"date":"2024-07-02","n_trades":2,"risk_used_r":2.0}"#).unwrap();
        let state = DailyRiskStore::new(&path).load(day(2));
        assert_eq!(state.trades_opened_count, 2);
    }

    #[test]
    fn transact_persists_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = DailyRiskStore::new(dir.path().join("nested/state.json"));
        store.update_after_trade(1.0, day(3)).unwrap();
        let state = store.update_after_trade(0.5, day(3)).unwrap();
        assert_eq!(state.trades_opened_count, 2);
        assert!((state.risk_used_r - 1.5).abs() < 1e-12);
        assert_eq!(store.load(day(3)), state);
    }
}
