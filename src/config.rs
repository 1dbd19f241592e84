//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files, with `.env` /
//! environment overrides for the data and results directories.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::schedule::MarketSchedule;
use crate::Symbol;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_strategy_name")]
    pub strategy_name: String,
    #[serde(default = "default_strategy")]
    pub strategy: serde_json::Value,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

fn default_symbol() -> String {
    "BTC".to_string()
}

fn default_strategy_name() -> String {
    "adaptive_breakout".to_string()
}

fn default_strategy() -> serde_json::Value {
    serde_json::json!({})
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        if let Ok(data_dir) = std::env::var("BREAKOUT_DATA_DIR") {
            config.backtest.data_dir = data_dir;
        }
        if let Ok(results_dir) = std::env::var("BREAKOUT_RESULTS_DIR") {
            config.backtest.results_dir = results_dir;
        }

        config.schedule()?;
        Ok(config)
    }

    pub fn symbol(&self) -> Symbol {
        Symbol::new(self.symbol.clone())
    }

    pub fn schedule(&self) -> Result<MarketSchedule, ConfigError> {
        MarketSchedule::from_config(&self.schedule)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            symbol: default_symbol(),
            strategy_name: default_strategy_name(),
            strategy: default_strategy(),
            schedule: ScheduleConfig::default(),
            backtest: BacktestConfig::default(),
        }
    }
}

/// When the daily routine fires
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Session open, `HH:MM` (UTC)
    pub market_open: String,
    /// Minutes after the open
    pub offset_minutes: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            market_open: "09:30".to_string(),
            offset_minutes: 20,
        }
    }
}

/// Backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub data_dir: String,
    pub results_dir: String,
    pub timeframe: String,
    /// Fee as a fraction of traded value
    pub commission: f64,
    /// Adverse price move applied to every fill
    pub slippage: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 100_000.0,
            start_date: Some("2020-10-28".to_string()),
            end_date: Some("2021-10-28".to_string()),
            data_dir: "data".to_string(),
            results_dir: "results".to_string(),
            timeframe: "1d".to_string(),
            commission: 0.0,
            slippage: 0.0,
        }
    }
}
