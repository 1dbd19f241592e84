//! Adaptive Breakout Configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveBreakoutConfig {
    /// Starting lookback in bars (default: 20)
    #[serde(default = "default_lookback")]
    pub lookback: usize,

    /// Lowest lookback the volatility adjustment may reach (default: 10)
    #[serde(default = "default_floor")]
    pub floor: usize,

    /// Highest lookback the volatility adjustment may reach (default: 30)
    #[serde(default = "default_ceiling")]
    pub ceiling: usize,

    /// Initial stop as a fraction of the breakout level (default: 0.98)
    #[serde(default = "default_initial_stop_risk")]
    pub initial_stop_risk: f64,

    /// Trailing stop as a fraction of the latest close (default: 0.90)
    #[serde(default = "default_trailing_stop_risk")]
    pub trailing_stop_risk: f64,

    /// Closes per volatility sample (default: 30)
    #[serde(default = "default_volatility_window")]
    pub volatility_window: usize,
}

fn default_lookback() -> usize {
    20
}
fn default_floor() -> usize {
    10
}
fn default_ceiling() -> usize {
    30
}
fn default_initial_stop_risk() -> f64 {
    0.98
}
fn default_trailing_stop_risk() -> f64 {
    0.90
}
fn default_volatility_window() -> usize {
    30
}

impl Default for AdaptiveBreakoutConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            floor: default_floor(),
            ceiling: default_ceiling(),
            initial_stop_risk: default_initial_stop_risk(),
            trailing_stop_risk: default_trailing_stop_risk(),
            volatility_window: default_volatility_window(),
        }
    }
}

impl AdaptiveBreakoutConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.floor == 0 {
            return Err(ConfigError::ZeroFloor);
        }
        if self.floor > self.ceiling {
            return Err(ConfigError::InvertedBounds {
                floor: self.floor,
                ceiling: self.ceiling,
            });
        }
        if self.lookback < self.floor || self.lookback > self.ceiling {
            return Err(ConfigError::LookbackOutOfBounds {
                lookback: self.lookback,
                floor: self.floor,
                ceiling: self.ceiling,
            });
        }
        for (name, value) in [
            ("initial_stop_risk", self.initial_stop_risk),
            ("trailing_stop_risk", self.trailing_stop_risk),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::RiskOutOfRange { name, value });
            }
        }
        if self.volatility_window < 2 {
            return Err(ConfigError::VolatilityWindowTooShort(self.volatility_window));
        }
        Ok(())
    }

    /// Closes needed for one volatility comparison (window plus the prior day)
    pub fn closes_required(&self) -> usize {
        self.volatility_window + 1
    }

    /// Bars to request so both the volatility and the breakout windows fit
    pub fn history_required(&self) -> usize {
        self.closes_required().max(self.ceiling)
    }
}
