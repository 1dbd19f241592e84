//! Core data types used across the strategy, providers and backtester

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ConfigError;

/// Validation errors for candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLCV candlestick data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self::new_unchecked(datetime, open, high, low, close, volume);
        candle.validate()?;
        Ok(candle)
    }

    /// Create a candle without validation (synthetic data, tests)
    pub fn new_unchecked(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }
}

/// Tradable instrument identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// Bar resolution requested from a history provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Minute,
    Hour,
    #[default]
    Daily,
}

impl Resolution {
    /// Time a single bar spans
    pub fn bar_duration(&self) -> Duration {
        match self {
            Resolution::Minute => Duration::minutes(1),
            Resolution::Hour => Duration::hours(1),
            Resolution::Daily => Duration::days(1),
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Minute => write!(f, "1m"),
            Resolution::Hour => write!(f, "1h"),
            Resolution::Daily => write!(f, "1d"),
        }
    }
}

impl std::str::FromStr for Resolution {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Resolution::Minute),
            "1h" => Ok(Resolution::Hour),
            "1d" => Ok(Resolution::Daily),
            other => Err(ConfigError::UnknownTimeframe(other.to_string())),
        }
    }
}

/// Completed round-trip trade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: Symbol,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub pnl: f64,
    pub commission: f64,
    pub net_pnl: f64,
    pub exit_reason: String,
}

impl Trade {
    pub fn return_pct(&self) -> f64 {
        ((self.exit_price - self.entry_price) / self.entry_price) * 100.0
    }
}

/// Backtest performance statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub total_commission: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_from_timeframe() {
        assert_eq!("1d".parse::<Resolution>(), Ok(Resolution::Daily));
        assert_eq!("1h".parse::<Resolution>(), Ok(Resolution::Hour));
        assert_eq!(Resolution::Daily.bar_duration(), Duration::days(1));
        assert_eq!(
            "4h".parse::<Resolution>(),
            Err(ConfigError::UnknownTimeframe("4h".to_string()))
        );
    }

    #[test]
    fn test_candle_validation_rejects_inverted_range() {
        let result = Candle::new(Utc::now(), 10.0, 9.0, 11.0, 10.0, 1.0);
        assert!(matches!(
            result,
            Err(CandleValidationError::HighLessThanLow { .. })
        ));
    }

    #[test]
    fn test_candle_validation_rejects_close_outside_range() {
        let result = Candle::new(Utc::now(), 10.0, 11.0, 9.0, 12.0, 1.0);
        assert!(matches!(
            result,
            Err(CandleValidationError::CloseOutOfRange { .. })
        ));
    }

    #[test]
    fn test_trade_return_pct() {
        let now = Utc::now();
        let trade = Trade {
            symbol: Symbol::new("BTC"),
            entry_price: 100.0,
            exit_price: 110.0,
            quantity: 1.0,
            entry_time: now,
            exit_time: now,
            pnl: 10.0,
            commission: 0.0,
            net_pnl: 10.0,
            exit_reason: "Stop Loss".to_string(),
        };
        assert!((trade.return_pct() - 10.0).abs() < 1e-9);
    }
}
