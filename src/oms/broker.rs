//! Simulated broker
//!
//! Single-instrument execution and portfolio accounting for backtests.
//! Target-holdings requests fill synchronously at the current close; sell
//! stops are checked against each new bar before the routine runs.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::oms::types::{Fill, Order, OrderId, OrderState, OrderType};
use crate::providers::{ExecutionProvider, PortfolioProvider};
use crate::{Candle, Side, Symbol, Trade};

/// Quantities below this are treated as flat
const QTY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
struct OpenPosition {
    quantity: f64,
    entry_price: f64,
    entry_time: DateTime<Utc>,
    /// Commission paid on the entry fills
    entry_commission: f64,
}

pub struct SimBroker {
    symbol: Symbol,
    cash: f64,
    commission_rate: f64,
    slippage: f64,
    position: Option<OpenPosition>,
    orders: HashMap<OrderId, Order>,
    current: Option<Candle>,
    closed_trades: Vec<Trade>,
}

impl SimBroker {
    pub fn new(symbol: Symbol, initial_cash: f64, commission_rate: f64, slippage: f64) -> Self {
        Self {
            symbol,
            cash: initial_cash,
            commission_rate,
            slippage,
            position: None,
            orders: HashMap::new(),
            current: None,
            closed_trades: Vec::new(),
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Cash plus the position marked at the current close
    pub fn equity(&self) -> f64 {
        let mark = self.current.as_ref().map_or(0.0, |c| c.close);
        self.cash + self.position.as_ref().map_or(0.0, |p| p.quantity * mark)
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Trades closed since the last call
    pub fn take_closed_trades(&mut self) -> Vec<Trade> {
        std::mem::take(&mut self.closed_trades)
    }

    fn now(&self) -> DateTime<Utc> {
        self.current.as_ref().map_or_else(Utc::now, |c| c.datetime)
    }

    fn check_symbol(&self, symbol: &Symbol) -> ProviderResult<()> {
        if symbol == &self.symbol {
            Ok(())
        } else {
            Err(ProviderError::Rejected {
                symbol: symbol.clone(),
                reason: format!("broker only trades {}", self.symbol),
            })
        }
    }

    /// Advance to a new bar and trigger any sell stop it crosses
    pub fn on_bar(&mut self, candle: &Candle) -> Vec<Fill> {
        self.current = Some(candle.clone());

        let mut stop_ids: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.is_active() && o.order_type == OrderType::Stop && o.side == Side::Sell)
            .map(|o| o.id)
            .collect();
        stop_ids.sort_unstable();

        let mut fills = Vec::new();
        for id in stop_ids {
            let Some(stop_price) = self.orders.get(&id).and_then(|o| o.stop_price) else {
                continue;
            };
            if candle.low > stop_price {
                continue;
            }
            let held = self.position.as_ref().map_or(0.0, |p| p.quantity);
            if held <= QTY_EPSILON {
                break;
            }

            // Gap through the stop fills at the open
            let price = candle.open.min(stop_price) * (1.0 - self.slippage);
            let quantity = self.orders.get(&id).map_or(0.0, |o| o.quantity).min(held);
            let fill = self.sell(id, quantity, price, "Stop Loss");
            if let Some(order) = self.orders.get_mut(&id) {
                order.state = OrderState::Filled;
                order.updated_at = candle.datetime;
            }
            info!(
                "{} STOP FILLED for {}: Stop={:.2}, Price={:.2}, Qty={:.4}",
                candle.datetime.format("%Y-%m-%d"),
                self.symbol,
                stop_price,
                price,
                quantity
            );
            fills.push(fill);
        }

        if self.position.is_none() {
            self.cancel_all(candle.datetime);
        }
        fills
    }

    /// Liquidate at the current close
    pub fn close_position(&mut self, reason: &str) -> Option<Fill> {
        let quantity = self.position.as_ref()?.quantity;
        let close = self.current.as_ref()?.close;
        let price = close * (1.0 - self.slippage);
        let fill = self.sell(0, quantity, price, reason);
        self.cancel_all(self.now());
        Some(fill)
    }

    fn cancel_all(&mut self, at: DateTime<Utc>) {
        for order in self.orders.values_mut().filter(|o| o.is_active()) {
            debug!(order = order.id, "Cancelling order on flat position");
            order.state = OrderState::Cancelled;
            order.updated_at = at;
        }
    }

    fn buy(&mut self, quantity: f64, price: f64) -> Fill {
        let timestamp = self.now();
        let commission = quantity * price * self.commission_rate;
        self.cash -= quantity * price + commission;

        let position = self.position.get_or_insert(OpenPosition {
            quantity: 0.0,
            entry_price: price,
            entry_time: timestamp,
            entry_commission: 0.0,
        });
        let total = position.quantity + quantity;
        position.entry_price = (position.entry_price * position.quantity + price * quantity) / total;
        position.quantity = total;
        position.entry_commission += commission;

        Fill {
            order_id: 0,
            side: Side::Buy,
            price,
            quantity,
            timestamp,
            commission,
        }
    }

    fn sell(&mut self, order_id: OrderId, quantity: f64, price: f64, reason: &str) -> Fill {
        let timestamp = self.now();
        let commission = quantity * price * self.commission_rate;
        self.cash += quantity * price - commission;

        if let Some(position) = self.position.as_mut() {
            let share = (quantity / position.quantity).min(1.0);
            let entry_commission = position.entry_commission * share;
            let pnl = (price - position.entry_price) * quantity;
            let trade_commission = entry_commission + commission;

            self.closed_trades.push(Trade {
                symbol: self.symbol.clone(),
                entry_price: position.entry_price,
                exit_price: price,
                quantity,
                entry_time: position.entry_time,
                exit_time: timestamp,
                pnl,
                commission: trade_commission,
                net_pnl: pnl - trade_commission,
                exit_reason: reason.to_string(),
            });

            position.quantity -= quantity;
            position.entry_commission -= entry_commission;
            if position.quantity <= QTY_EPSILON {
                self.position = None;
            }
        }

        Fill {
            order_id,
            side: Side::Sell,
            price,
            quantity,
            timestamp,
            commission,
        }
    }
}

impl ExecutionProvider for SimBroker {
    fn set_target_holdings(&mut self, symbol: &Symbol, fraction: f64) -> ProviderResult<()> {
        self.check_symbol(symbol)?;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ProviderError::Rejected {
                symbol: symbol.clone(),
                reason: format!("target fraction {} outside [0, 1]", fraction),
            });
        }
        let close = self
            .current
            .as_ref()
            .map(|c| c.close)
            .ok_or_else(|| ProviderError::NoMarketData(symbol.clone()))?;

        let held = self.position.as_ref().map_or(0.0, |p| p.quantity);
        let target_value = self.equity() * fraction;
        let current_value = held * close;

        if target_value > current_value {
            let price = close * (1.0 + self.slippage);
            let quantity = (target_value - current_value).min(self.cash)
                / (price * (1.0 + self.commission_rate));
            if quantity <= QTY_EPSILON {
                return Err(ProviderError::Rejected {
                    symbol: symbol.clone(),
                    reason: "insufficient cash".to_string(),
                });
            }
            self.buy(quantity, price);
            info!(
                "{} BUY EXECUTED for {}: Price={:.2}, Qty={:.4}",
                self.now().format("%Y-%m-%d"),
                symbol,
                price,
                quantity
            );
        } else if current_value > target_value && held > QTY_EPSILON {
            let quantity = ((current_value - target_value) / close).min(held);
            let price = close * (1.0 - self.slippage);
            self.sell(0, quantity, price, "Rebalance");
            if self.position.is_none() {
                self.cancel_all(self.now());
            }
        }
        Ok(())
    }

    fn place_stop_order(
        &mut self,
        symbol: &Symbol,
        quantity: f64,
        stop_price: f64,
    ) -> ProviderResult<OrderId> {
        self.check_symbol(symbol)?;
        let held = self
            .position
            .as_ref()
            .map(|p| p.quantity)
            .ok_or_else(|| ProviderError::NoPosition(symbol.clone()))?;
        if quantity <= 0.0 || quantity > held + QTY_EPSILON || stop_price <= 0.0 {
            return Err(ProviderError::Rejected {
                symbol: symbol.clone(),
                reason: format!("invalid stop: qty={} held={} stop={}", quantity, held, stop_price),
            });
        }

        let order = Order::stop_sell(symbol.clone(), quantity, stop_price, self.now());
        let id = order.id;
        self.orders.insert(id, order);
        Ok(id)
    }

    fn update_order(&mut self, order: OrderId, stop_price: f64) -> ProviderResult<()> {
        let now = self.now();
        match self.orders.get_mut(&order) {
            Some(o) if o.is_active() && o.order_type == OrderType::Stop => {
                o.stop_price = Some(stop_price);
                o.updated_at = now;
                Ok(())
            }
            _ => Err(ProviderError::UnknownOrder(order)),
        }
    }

    fn open_orders(&self, symbol: &Symbol) -> Vec<OrderId> {
        let mut ids: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.is_active() && &o.symbol == symbol)
            .map(|o| o.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl PortfolioProvider for SimBroker {
    fn is_invested(&self, symbol: &Symbol) -> bool {
        symbol == &self.symbol && self.position.is_some()
    }

    fn quantity(&self, symbol: &Symbol) -> f64 {
        if symbol == &self.symbol {
            self.position.as_ref().map_or(0.0, |p| p.quantity)
        } else {
            0.0
        }
    }

    fn current_close(&self, symbol: &Symbol) -> ProviderResult<f64> {
        self.check_symbol(symbol)?;
        self.current
            .as_ref()
            .map(|c| c.close)
            .ok_or_else(|| ProviderError::NoMarketData(symbol.clone()))
    }
}
