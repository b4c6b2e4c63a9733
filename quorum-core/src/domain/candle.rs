//! Candle — the OHLCV unit consumed by every scoring component.

use serde::{Deserialize, Serialize};

/// One OHLCV candle. `t` is the candle time in Unix seconds.
///
/// Series are ordered by non-decreasing `t` and unique per (pair, interval).
/// The core never mutates candles; it only reads windows of them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub t: i64,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
}

impl Candle {
    pub fn new(t: i64, o: f64, h: f64, l: f64, c: f64, v: f64) -> Self {
        Self { t, o, h, l, c, v }
    }

    /// Returns true if any price field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.o.is_finite() && self.h.is_finite() && self.l.is_finite() && self.c.is_finite())
    }

    /// Basic OHLC sanity check: high bounds the body from above, low from below.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.h >= self.l
            && self.h >= self.o
            && self.h >= self.c
            && self.l <= self.o
            && self.l <= self.c
            && self.c > 0.0
    }
}

/// Split a candle slice into parallel high/low/close vectors.
pub fn hlc(candles: &[Candle]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut highs = Vec::with_capacity(candles.len());
    let mut lows = Vec::with_capacity(candles.len());
    let mut closes = Vec::with_capacity(candles.len());
    for candle in candles {
        highs.push(candle.h);
        lows.push(candle.l);
        closes.push(candle.c);
    }
    (highs, lows, closes)
}

/// Close prices of a candle slice.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Candle {
        Candle::new(1_700_000_000, 100.0, 105.0, 98.0, 103.0, 12.5)
    }

    #[test]
    fn candle_is_sane() {
        assert!(sample().is_sane());
    }

    #[test]
    fn candle_detects_void() {
        let mut candle = sample();
        candle.h = f64::NAN;
        assert!(candle.is_void());
        assert!(!candle.is_sane());
    }

    #[test]
    fn candle_detects_inverted_range() {
        let mut candle = sample();
        candle.h = 97.0;
        assert!(!candle.is_sane());
    }

    #[test]
    fn candle_wire_names_are_single_letters() {
        let json = serde_json::to_value(sample()).unwrap();
        for key in ["t", "o", "h", "l", "c", "v"] {
            assert!(json.get(key).is_some(), "missing field {key}");
        }
    }

    #[test]
    fn hlc_splits_columns() {
        let (h, l, c) = hlc(&[sample(), sample()]);
        assert_eq!(h, vec![105.0, 105.0]);
        assert_eq!(l, vec![98.0, 98.0]);
        assert_eq!(c, vec![103.0, 103.0]);
    }
}
