//! Adaptive Breakout
//!
//! A daily breakout strategy whose lookback window stretches and shrinks
//! with volatility, protected by a ratcheting trailing stop. The strategy
//! is a pure decision function; history, execution and portfolio state are
//! injected through provider traits, with an in-process simulated host for
//! backtesting.

pub mod backtest;
pub mod config;
pub mod data;
pub mod error;
pub mod indicators;
pub mod oms;
pub mod providers;
pub mod runner;
pub mod schedule;
pub mod strategies;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, ProviderError};
pub use runner::DailyRoutine;
pub use strategies::Strategy;
pub use types::*;
