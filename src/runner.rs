//! Daily routine
//!
//! Glue between a pure [`Strategy`] and the host providers. One call to
//! [`DailyRoutine::run_cycle`] is one scheduled trigger: fetch history, read
//! the portfolio, decide, apply the actions and fold the outcomes back into
//! the strategy state.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::oms::OrderId;
use crate::providers::{ExecutionProvider, HistoryProvider, PortfolioProvider};
use crate::strategies::{Action, ActionOutcome, Decision, Strategy, StrategyContext};
use crate::{Candle, Resolution, Symbol};

/// Result of one cycle: the next state and every action with its outcome
#[derive(Debug, Clone)]
pub struct CycleReport<S> {
    pub state: S,
    pub actions: Vec<(Action, ActionOutcome)>,
}

impl<S> CycleReport<S> {
    fn unchanged(state: S) -> Self {
        Self {
            state,
            actions: Vec::new(),
        }
    }

    pub fn entered(&self) -> bool {
        self.actions.iter().any(|(action, outcome)| {
            matches!(action, Action::SetHoldings { .. }) && *outcome == ActionOutcome::Accepted
        })
    }
}

pub struct DailyRoutine<S: Strategy> {
    strategy: S,
    symbol: Symbol,
    resolution: Resolution,
}

impl<S: Strategy> DailyRoutine<S> {
    pub fn new(strategy: S, symbol: Symbol) -> Self {
        Self {
            strategy,
            symbol,
            resolution: Resolution::Daily,
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn initial_state(&self) -> S::State {
        self.strategy.initial_state()
    }

    /// Run one scheduled cycle
    pub fn run_cycle<H, B>(
        &self,
        state: &S::State,
        history: &H,
        broker: &mut B,
        timestamp: DateTime<Utc>,
    ) -> CycleReport<S::State>
    where
        H: HistoryProvider,
        B: ExecutionProvider + PortfolioProvider,
    {
        let close = match broker.current_close(&self.symbol) {
            Ok(close) => close,
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "No current price, skipping cycle");
                return CycleReport::unchanged(state.clone());
            }
        };

        // A failed fetch still lets the strategy reconcile against the book
        let candles = history
            .history(&self.symbol, self.strategy.history_required(), self.resolution)
            .unwrap_or_else(|e| {
                warn!(symbol = %self.symbol, error = %e, "History request failed");
                Vec::new()
            });

        let decision = {
            let open_orders = broker.open_orders(&self.symbol);
            let ctx = self.context(&candles, close, &*broker, &open_orders, timestamp);
            self.strategy.on_cycle(state, &ctx)
        };

        let mut report = CycleReport::unchanged(decision.state.clone());
        self.apply(decision, broker, &mut report);

        if report.entered() && broker.is_invested(&self.symbol) {
            debug!(symbol = %self.symbol, "Entry filled in cycle, managing position");
            let decision = {
                let open_orders = broker.open_orders(&self.symbol);
                let ctx = self.context(&candles, close, &*broker, &open_orders, timestamp);
                self.strategy.manage_position(&report.state, &ctx)
            };
            self.apply(decision, broker, &mut report);
        }

        report
    }

    fn context<'a, P: PortfolioProvider>(
        &'a self,
        candles: &'a [Candle],
        close: f64,
        portfolio: &P,
        open_orders: &'a [OrderId],
        timestamp: DateTime<Utc>,
    ) -> StrategyContext<'a> {
        StrategyContext {
            symbol: &self.symbol,
            candles,
            close,
            invested: portfolio.is_invested(&self.symbol),
            quantity: portfolio.quantity(&self.symbol),
            open_orders,
            timestamp,
        }
    }

    fn apply<B: ExecutionProvider>(
        &self,
        decision: Decision<S::State>,
        broker: &mut B,
        report: &mut CycleReport<S::State>,
    ) {
        let mut state = decision.state;
        for action in decision.actions {
            let outcome = execute(broker, &action);
            state = self.strategy.on_action_result(state, &action, &outcome);
            report.actions.push((action, outcome));
        }
        report.state = state;
    }
}

fn execute<B: ExecutionProvider>(broker: &mut B, action: &Action) -> ActionOutcome {
    let result = match action {
        Action::SetHoldings { symbol, fraction } => broker
            .set_target_holdings(symbol, *fraction)
            .map(|_| ActionOutcome::Accepted),
        Action::PlaceStop {
            symbol,
            quantity,
            stop_price,
        } => broker
            .place_stop_order(symbol, *quantity, *stop_price)
            .map(ActionOutcome::Placed),
        Action::UpdateStop { order, stop_price } => broker
            .update_order(*order, *stop_price)
            .map(|_| ActionOutcome::Accepted),
    };
    result.unwrap_or_else(ActionOutcome::Failed)
}
