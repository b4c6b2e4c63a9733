//! Pure indicator functions over price slices.
//!
//! Unlike a streaming indicator, each function looks at the whole slice it is
//! given and reports only what the trailing data supports:
//! - `ema` returns the smoothed series from the seed onward,
//! - `rsi` and `atr` return the latest value, or `None` on short input.

pub mod atr;
pub mod ema;
pub mod rsi;

pub use atr::{atr, true_range};
pub use ema::{ema, ema_last};
pub use rsi::rsi;

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
