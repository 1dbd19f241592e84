//! Breakout detection
//!
//! The breakout level is the highest high of the lookback window, excluding
//! the most recent bar.

use crate::indicators::highest;

/// Highest high of all but the final bar, `None` with fewer than two highs
pub fn breakout_level(highs: &[f64]) -> Option<f64> {
    if highs.len() < 2 {
        return None;
    }
    highest(&highs[..highs.len() - 1])
}

/// Breakout level if a flat book should enter at `close`
pub fn detect_breakout(invested: bool, close: f64, highs: &[f64]) -> Option<f64> {
    if invested {
        return None;
    }
    breakout_level(highs).filter(|&level| close >= level)
}
