//! Trading Strategies Module
//!
//! A strategy is a pure decision function: it receives its previous state and
//! a read-only `StrategyContext`, and returns the next state together with the
//! actions it wants the host to perform. Applying those actions against real
//! providers is the job of [`crate::runner::DailyRoutine`].

pub mod adaptive_breakout;

use crate::error::ProviderError;
use crate::oms::OrderId;
use crate::{Candle, Config, Symbol};
use anyhow::Result;
use chrono::{DateTime, Utc};

// =============================================================================
// Strategy Trait - The contract all strategies must implement
// =============================================================================

pub trait Strategy {
    /// Per-instrument state carried between cycles
    type State: Clone + std::fmt::Debug;

    /// Strategy identifier (must match config's strategy_name)
    fn name(&self) -> &'static str;

    fn initial_state(&self) -> Self::State;

    /// Bars of history the next cycle needs
    fn history_required(&self) -> usize;

    /// Full scheduled decision: signal generation plus position management
    fn on_cycle(&self, state: &Self::State, ctx: &StrategyContext) -> Decision<Self::State>;

    /// Position management only. Called again in the same cycle when an
    /// entry fills synchronously.
    fn manage_position(&self, state: &Self::State, ctx: &StrategyContext)
        -> Decision<Self::State>;

    /// Fold the provider's answer to an action back into the state
    fn on_action_result(
        &self,
        state: Self::State,
        action: &Action,
        outcome: &ActionOutcome,
    ) -> Self::State;
}

/// Read-only market and portfolio snapshot for one decision
#[derive(Debug)]
pub struct StrategyContext<'a> {
    pub symbol: &'a Symbol,
    /// History window, most recent last
    pub candles: &'a [Candle],
    pub close: f64,
    pub invested: bool,
    pub quantity: f64,
    pub open_orders: &'a [OrderId],
    pub timestamp: DateTime<Utc>,
}

/// Intended side effect on the execution provider
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetHoldings { symbol: Symbol, fraction: f64 },
    PlaceStop {
        symbol: Symbol,
        quantity: f64,
        stop_price: f64,
    },
    UpdateStop { order: OrderId, stop_price: f64 },
}

/// What the provider did with an action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Accepted,
    Placed(OrderId),
    Failed(ProviderError),
}

/// Next state plus the actions that lead to it
#[derive(Debug, Clone)]
pub struct Decision<S> {
    pub state: S,
    pub actions: Vec<Action>,
}

impl<S> Decision<S> {
    pub fn hold(state: S) -> Self {
        Self {
            state,
            actions: Vec::new(),
        }
    }
}

/// Create the configured strategy
pub fn create_strategy(config: &Config) -> Result<adaptive_breakout::AdaptiveBreakoutStrategy> {
    match config.strategy_name.as_str() {
        "adaptive_breakout" => adaptive_breakout::create(config),
        other => anyhow::bail!(
            "Unknown strategy: '{}'. Available: {}",
            other,
            available_strategies().join(", ")
        ),
    }
}

/// Get list of available strategy names
pub fn available_strategies() -> Vec<&'static str> {
    vec!["adaptive_breakout"]
}
