//! Error types shared by providers and configuration

use crate::oms::OrderId;
use crate::Symbol;
use thiserror::Error;

/// Failures reported by history, execution or portfolio providers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("history unavailable for {symbol}: {reason}")]
    HistoryUnavailable { symbol: Symbol, reason: String },

    #[error("unknown or inactive order {0}")]
    UnknownOrder(OrderId),

    #[error("order rejected for {symbol}: {reason}")]
    Rejected { symbol: Symbol, reason: String },

    #[error("no open position for {0}")]
    NoPosition(Symbol),

    #[error("no market data for {0}")]
    NoMarketData(Symbol),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Invalid strategy or schedule parameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("lookback floor must be at least 1")]
    ZeroFloor,

    #[error("lookback bounds are inverted: floor {floor} > ceiling {ceiling}")]
    InvertedBounds { floor: usize, ceiling: usize },

    #[error("initial lookback {lookback} outside [{floor}, {ceiling}]")]
    LookbackOutOfBounds {
        lookback: usize,
        floor: usize,
        ceiling: usize,
    },

    #[error("{name} must be in (0, 1], got {value}")]
    RiskOutOfRange { name: &'static str, value: f64 },

    #[error("volatility window must be at least 2, got {0}")]
    VolatilityWindowTooShort(usize),

    #[error("invalid market open time '{0}', expected HH:MM")]
    InvalidMarketOpen(String),

    #[error("unknown timeframe '{0}', expected 1m, 1h or 1d")]
    UnknownTimeframe(String),
}
