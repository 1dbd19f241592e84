//! Host collaborator interfaces
//!
//! The strategy never talks to a platform directly. History, execution and
//! portfolio state are injected through these traits; `backtest` provides
//! the in-process implementations.

use crate::error::ProviderResult;
use crate::oms::OrderId;
use crate::{Candle, Resolution, Symbol};

/// Source of historical bars
pub trait HistoryProvider {
    /// Up to `n` bars for `symbol`, most recent last
    fn history(&self, symbol: &Symbol, n: usize, resolution: Resolution)
        -> ProviderResult<Vec<Candle>>;
}

/// Order entry and open-order state
pub trait ExecutionProvider {
    /// Rebalance `symbol` to `fraction` of portfolio value
    fn set_target_holdings(&mut self, symbol: &Symbol, fraction: f64) -> ProviderResult<()>;

    /// Place a sell stop for `quantity`, returning its handle
    fn place_stop_order(
        &mut self,
        symbol: &Symbol,
        quantity: f64,
        stop_price: f64,
    ) -> ProviderResult<OrderId>;

    /// Move the stop price of an existing order
    fn update_order(&mut self, order: OrderId, stop_price: f64) -> ProviderResult<()>;

    fn open_orders(&self, symbol: &Symbol) -> Vec<OrderId>;
}

/// Position accounting and latest prices
pub trait PortfolioProvider {
    fn is_invested(&self, symbol: &Symbol) -> bool;

    fn quantity(&self, symbol: &Symbol) -> f64;

    fn current_close(&self, symbol: &Symbol) -> ProviderResult<f64>;
}
