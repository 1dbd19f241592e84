//! Adaptive Breakout Strategy
//!
//! Volatility-adjusted breakout entry with a ratcheting trailing stop.

pub mod breakout;
pub mod config;
pub mod lookback;
pub mod state;
pub mod strategy;
pub mod trailing;

pub use breakout::{breakout_level, detect_breakout};
pub use config::AdaptiveBreakoutConfig;
pub use lookback::{update_lookback, LookbackSkip, LookbackUpdate};
pub use state::{BreakoutState, Holding, Phase};
pub use strategy::AdaptiveBreakoutStrategy;
pub use trailing::{initial_stop_price, trail, TrailUpdate};

use crate::Config;
use anyhow::{Context, Result};

/// Build the strategy from the `strategy` section of a config
pub fn create(config: &Config) -> Result<AdaptiveBreakoutStrategy> {
    let strategy_config: AdaptiveBreakoutConfig = serde_json::from_value(config.strategy.clone())
        .context("Failed to parse adaptive_breakout config")?;
    strategy_config
        .validate()
        .context("Invalid adaptive_breakout parameters")?;
    Ok(AdaptiveBreakoutStrategy::new(strategy_config))
}
