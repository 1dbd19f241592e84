//! Core OMS types
//!
//! Orders and fills handled by the simulated broker.

use crate::{Side, Symbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Order handle returned by an execution provider
pub type OrderId = u64;

static ORDER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate next order ID (thread-safe, lock-free)
pub fn next_order_id() -> OrderId {
    ORDER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Order type - determines execution logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Stop-loss: converts to market when stop triggered
    /// Sell stop: triggers when price ≤ stop_price
    Stop,
}

/// Order state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Order accepted and active
    Open,

    /// Order completely filled
    Filled,

    /// Order cancelled
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: f64,

    /// Stop price (stop orders only)
    pub stop_price: Option<f64>,

    pub state: OrderState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        quantity: f64,
        stop_price: Option<f64>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: next_order_id(),
            symbol,
            side,
            order_type,
            quantity,
            stop_price,
            state: OrderState::Open,
            created_at,
            updated_at: created_at,
        }
    }

    /// Protective sell stop covering `quantity`
    pub fn stop_sell(
        symbol: Symbol,
        quantity: f64,
        stop_price: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            symbol,
            Side::Sell,
            OrderType::Stop,
            quantity,
            Some(stop_price),
            created_at,
        )
    }

    pub fn is_active(&self) -> bool {
        self.state == OrderState::Open
    }
}

/// Individual fill record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
    pub commission: f64,
}
