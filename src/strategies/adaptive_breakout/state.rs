//! Per-instrument strategy state
//!
//! Breakout level and high-water mark only exist inside the invested phases,
//! so they cannot be read while flat.

use serde::{Deserialize, Serialize};

use super::trailing::TrailUpdate;
use crate::oms::OrderId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutState {
    pub lookback: usize,
    pub phase: Phase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Phase {
    Flat,
    /// Entry requested, fill not yet visible in the portfolio
    Entering { breakout_level: f64 },
    Invested(Holding),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub breakout_level: f64,
    /// Highest close since entry that moved the stop
    pub highest_price: f64,
    /// Handle of the protective stop, once the provider confirmed it
    pub stop_order: Option<OrderId>,
    /// Last stop price the provider confirmed
    pub stop_price: Option<f64>,
    /// Trail sent to the provider but not yet confirmed
    #[serde(default)]
    pub pending: Option<TrailUpdate>,
}

impl Holding {
    pub fn new(breakout_level: f64) -> Self {
        Self {
            breakout_level,
            highest_price: breakout_level,
            stop_order: None,
            stop_price: None,
            pending: None,
        }
    }

    /// Highest close seen so far, counting an unconfirmed trail
    pub fn high_water(&self) -> f64 {
        self.pending
            .map_or(self.highest_price, |p| p.highest_price.max(self.highest_price))
    }

    /// Stop the position should carry: never below the floor, the confirmed
    /// stop or a trail still waiting for confirmation
    pub fn target_stop(&self, floor: f64) -> f64 {
        let confirmed = self.stop_price.map_or(floor, |s| s.max(floor));
        self.pending
            .map_or(confirmed, |p| p.stop_price.max(confirmed))
    }

    /// Commit a confirmed stop, folding in the pending high-water mark
    pub fn confirm_stop(&mut self, order: OrderId, stop_price: f64) {
        self.stop_order = Some(order);
        self.stop_price = Some(stop_price);
        if let Some(pending) = self.pending.take() {
            self.highest_price = self.highest_price.max(pending.highest_price);
        }
    }
}

impl BreakoutState {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback,
            phase: Phase::Flat,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.phase, Phase::Flat)
    }

    pub fn holding(&self) -> Option<&Holding> {
        match &self.phase {
            Phase::Invested(holding) => Some(holding),
            _ => None,
        }
    }

    pub fn breakout_level(&self) -> Option<f64> {
        match &self.phase {
            Phase::Flat => None,
            Phase::Entering { breakout_level } => Some(*breakout_level),
            Phase::Invested(holding) => Some(holding.breakout_level),
        }
    }

    pub fn stop_price(&self) -> Option<f64> {
        self.holding().and_then(|h| h.stop_price)
    }
}
