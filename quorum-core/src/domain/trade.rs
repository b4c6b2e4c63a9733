//! Trade journal records and their identity key.
//!
//! A trade is opened once and closed at most once. Closure is a separate
//! record keyed by [`TradeKey`], never an in-place edit of the open record.

use super::side::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Price and size precision used for identity comparison.
pub const KEY_DECIMALS: u32 = 8;

const KEY_SCALE: f64 = 100_000_000.0;

/// Convert a price or size to the fixed-point integer used in [`TradeKey`].
pub fn to_fixed(value: f64) -> i64 {
    (value * KEY_SCALE).round() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// How a trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Tp,
    Sl,
    Manual,
    Unknown,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Tp => "TP",
            Outcome::Sl => "SL",
            Outcome::Manual => "MANUAL",
            Outcome::Unknown => "UNKNOWN",
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TP" => Ok(Outcome::Tp),
            "SL" => Ok(Outcome::Sl),
            "MANUAL" => Ok(Outcome::Manual),
            "UNKNOWN" => Ok(Outcome::Unknown),
            other => Err(format!("unknown outcome '{other}'")),
        }
    }
}

/// Exact, hashable identity of a trade.
///
/// Prices and size are held as fixed-point integers at [`KEY_DECIMALS`]
/// places so two records describing the same trade compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TradeKey {
    /// Open time, unix seconds.
    pub open_time: i64,
    pub pair: String,
    pub side: Side,
    pub entry: i64,
    pub stop_loss: i64,
    pub take_profit: i64,
    pub size: i64,
}

impl TradeKey {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        open_time: DateTime<Utc>,
        pair: &str,
        side: Side,
        entry: f64,
        stop_loss: f64,
        take_profit: f64,
        size: f64,
    ) -> Self {
        Self {
            open_time: open_time.timestamp(),
            pair: pair.to_string(),
            side,
            entry: to_fixed(entry),
            stop_loss: to_fixed(stop_loss),
            take_profit: to_fixed(take_profit),
            size: to_fixed(size),
        }
    }

    /// Stable hex digest of the key, for logs and external references.
    pub fn fingerprint(&self) -> String {
        let canonical = format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.open_time,
            self.pair,
            self.side.as_str(),
            self.entry,
            self.stop_loss,
            self.take_profit,
            self.size
        );
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }
}

/// Realized PnL as a multiple of the initial entry-to-stop risk.
///
/// Returns 0.0 when the risk distance is not positive or not finite.
pub fn realized_r(side: Side, entry: f64, stop_loss: f64, exit: f64) -> f64 {
    let (reward, risk) = match side {
        Side::Long => (exit - entry, entry - stop_loss),
        Side::Short => (entry - exit, stop_loss - entry),
    };
    if !risk.is_finite() || risk <= 0.0 {
        return 0.0;
    }
    let r = reward / risk;
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

/// OPEN journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenTradeRecord {
    /// Open time, RFC 3339 UTC.
    pub t: DateTime<Utc>,
    pub pair: String,
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub size: f64,
    pub status: TradeStatus,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl OpenTradeRecord {
    pub fn key(&self) -> TradeKey {
        TradeKey::new(
            self.t,
            &self.pair,
            self.side,
            self.entry,
            self.stop_loss,
            self.take_profit,
            self.size,
        )
    }
}

/// CLOSED journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTradeRecord {
    // ── Identity ──
    pub pair: String,
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub size: f64,
    pub open_time: DateTime<Utc>,

    // ── Exit ──
    pub exit_time: DateTime<Utc>,
    pub exit: f64,
    pub outcome: Outcome,
    pub pnl_r: f64,

    pub status: TradeStatus,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl ClosedTradeRecord {
    pub fn key(&self) -> TradeKey {
        TradeKey::new(
            self.open_time,
            &self.pair,
            self.side,
            self.entry,
            self.stop_loss,
            self.take_profit,
            self.size,
        )
    }

    pub fn is_winner(&self) -> bool {
        self.pnl_r > 0.0
    }
}
