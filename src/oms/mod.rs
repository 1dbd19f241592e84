//! Order Management System (OMS)
//!
//! Order and fill records plus the simulated broker used for backtesting:
//! - Market fills at the current close for target-holdings requests
//! - Sell stops checked against each bar's low, gaps fill at the open
//! - Single position per symbol

pub mod broker;
pub mod types;

pub use broker::SimBroker;
pub use types::{Fill, Order, OrderId, OrderState, OrderType};
