//! Technical indicators powered by the `ta` crate
//!
//! Only what the breakout strategy needs: population standard deviation of
//! a close window and the highest high of a window.

use ta::indicators::StandardDeviation;
use ta::Next;

/// Population standard deviation of a whole window
///
/// Each call runs a fresh indicator over `values`, so a constant window is
/// exactly zero whatever preceded it.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let mut indicator = StandardDeviation::new(values.len()).ok()?;
    values.iter().fold(None, |_, &value| Some(indicator.next(value)))
}

/// Highest value in a slice, `None` when empty
pub fn highest(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .fold(None, |max, v| Some(max.map_or(v, |m: f64| m.max(v))))
}
