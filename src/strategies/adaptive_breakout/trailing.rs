//! Ratcheting trailing stop
//!
//! Stops may tighten, never loosen. The stop only moves when the close makes
//! a new high since entry and the trailed level sits above the current stop.

use serde::{Deserialize, Serialize};

/// Initial protective stop below the breakout level
pub fn initial_stop_price(breakout_level: f64, initial_stop_risk: f64) -> f64 {
    breakout_level * initial_stop_risk
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailUpdate {
    pub highest_price: f64,
    pub stop_price: f64,
}

/// New high-water mark and stop, or `None` when the stop stays put
pub fn trail(
    highest_price: f64,
    stop_price: f64,
    close: f64,
    trailing_stop_risk: f64,
) -> Option<TrailUpdate> {
    let candidate = close * trailing_stop_risk;
    if close > highest_price && stop_price < candidate {
        Some(TrailUpdate {
            highest_price: close,
            stop_price: candidate,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_initial_stop_two_percent_below_breakout() {
        assert_relative_eq!(initial_stop_price(100.0, 0.98), 98.0);
    }

    #[test]
    fn test_trail_on_new_high() {
        let update = trail(100.0, 98.0, 120.0, 0.90).unwrap();
        assert_relative_eq!(update.highest_price, 120.0);
        assert_relative_eq!(update.stop_price, 108.0);
    }

    #[test]
    fn test_no_trail_on_pullback() {
        assert_eq!(trail(120.0, 108.0, 105.0, 0.90), None);
    }

    #[test]
    fn test_no_trail_when_candidate_below_stop() {
        // New high, but 105 * 0.9 = 94.5 would loosen a 98 stop
        assert_eq!(trail(100.0, 98.0, 105.0, 0.90), None);
    }
}
