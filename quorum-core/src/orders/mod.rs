//! Order level calculator.
//!
//! LONG:  stop = price * (1 - d), target = entry + (entry - stop) * rr
//! SHORT: stop = price * (1 + d), target = entry - (stop - entry) * rr
//!
//! Levels are rounded to [`LEVEL_DECIMALS`] places.

use crate::domain::{Side, SideParseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LEVEL_DECIMALS: i32 = 6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LevelsError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl From<SideParseError> for LevelsError {
    fn from(e: SideParseError) -> Self {
        LevelsError::InvalidParameter(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLevels {
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_pct: f64,
    pub rr: f64,
}

impl OrderLevels {
    /// Absolute entry-to-stop distance.
    pub fn risk_distance(&self) -> f64 {
        (self.entry - self.stop_loss).abs()
    }
}

fn round_level(value: f64) -> f64 {
    let scale = 10f64.powi(LEVEL_DECIMALS);
    (value * scale).round() / scale
}

pub fn compute_order_levels(
    side: Side,
    price: f64,
    risk_pct: f64,
    rr: f64,
    sl_distance_pct: f64,
) -> Result<OrderLevels, LevelsError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(LevelsError::InvalidParameter(format!(
            "price must be positive, got {price}"
        )));
    }
    if !rr.is_finite() || rr < 0.0 {
        return Err(LevelsError::InvalidParameter(format!(
            "rr must be non-negative, got {rr}"
        )));
    }
    if !sl_distance_pct.is_finite() || sl_distance_pct <= 0.0 || sl_distance_pct >= 1.0 {
        return Err(LevelsError::InvalidParameter(format!(
            "sl_distance_pct must be in (0, 1), got {sl_distance_pct}"
        )));
    }

    let entry = price;
    let (stop_loss, take_profit) = match side {
        Side::Long => {
            let stop = price * (1.0 - sl_distance_pct);
            (stop, entry + (entry - stop) * rr)
        }
        Side::Short => {
            let stop = price * (1.0 + sl_distance_pct);
            (stop, entry - (stop - entry) * rr)
        }
    };

    Ok(OrderLevels {
        side,
        entry: round_level(entry),
        stop_loss: round_level(stop_loss),
        take_profit: round_level(take_profit),
        risk_pct,
        rr,
    })
}

/// Same as [`compute_order_levels`] with the side given as text.
pub fn compute_order_levels_str(
    side: &str,
    price: f64,
    risk_pct: f64,
    rr: f64,
    sl_distance_pct: f64,
) -> Result<OrderLevels, LevelsError> {
    let side: Side = side.parse()?;
    compute_order_levels(side, price, risk_pct, rr, sl_distance_pct)
}
