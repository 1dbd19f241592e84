//! Adaptive Breakout Strategy
//!
//! Entry: close at or above the highest high of the volatility-adjusted
//! lookback window (excluding the latest bar)
//! Exit: protective sell stop 2% under the breakout level, ratcheted up to
//! 10% under each new closing high

use tracing::{debug, info, warn};

use super::breakout::detect_breakout;
use super::config::AdaptiveBreakoutConfig;
use super::lookback::{update_lookback, LookbackSkip, LookbackUpdate};
use super::state::{BreakoutState, Holding, Phase};
use super::trailing::{initial_stop_price, trail};
use crate::strategies::{Action, ActionOutcome, Decision, Strategy, StrategyContext};

pub struct AdaptiveBreakoutStrategy {
    config: AdaptiveBreakoutConfig,
}

impl AdaptiveBreakoutStrategy {
    pub fn new(config: AdaptiveBreakoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdaptiveBreakoutConfig {
        &self.config
    }

    /// Align the recorded phase with the portfolio before deciding anything.
    /// The strategy has no exit signal of its own: a stop fill shows up here
    /// as an invested phase on a flat book.
    fn reconcile(&self, state: &BreakoutState, ctx: &StrategyContext) -> BreakoutState {
        let mut next = state.clone();
        match (&state.phase, ctx.invested) {
            (Phase::Invested(holding), false) => {
                info!(
                    symbol = %ctx.symbol,
                    breakout_level = holding.breakout_level,
                    stop_price = ?holding.stop_price,
                    "Position closed, back to flat"
                );
                next.phase = Phase::Flat;
            }
            (Phase::Entering { breakout_level }, false) => {
                warn!(
                    symbol = %ctx.symbol,
                    breakout_level,
                    "Entry never filled, back to flat"
                );
                next.phase = Phase::Flat;
            }
            (Phase::Flat, true) => {
                warn!(
                    symbol = %ctx.symbol,
                    quantity = ctx.quantity,
                    "Invested without a recorded breakout level, stop management skipped"
                );
            }
            _ => {}
        }
        next
    }

    fn apply_lookback(&self, state: &mut BreakoutState, ctx: &StrategyContext) {
        let closes: Vec<f64> = ctx.candles.iter().map(|c| c.close).collect();
        match update_lookback(state.lookback, &closes, &self.config) {
            LookbackUpdate::Adjusted {
                previous,
                lookback,
                delta,
            } => {
                debug!(
                    symbol = %ctx.symbol,
                    previous,
                    lookback,
                    delta,
                    "Lookback adjusted"
                );
                state.lookback = lookback;
            }
            LookbackUpdate::Unchanged { lookback, reason } => {
                if reason == LookbackSkip::ZeroVolatility {
                    warn!(symbol = %ctx.symbol, lookback, "Zero volatility, lookback unchanged");
                } else {
                    warn!(symbol = %ctx.symbol, lookback, %reason, "Lookback unchanged");
                }
            }
        }
    }
}

impl Strategy for AdaptiveBreakoutStrategy {
    type State = BreakoutState;

    fn name(&self) -> &'static str {
        "adaptive_breakout"
    }

    fn initial_state(&self) -> BreakoutState {
        BreakoutState::new(self.config.lookback)
    }

    fn history_required(&self) -> usize {
        self.config.history_required()
    }

    fn on_cycle(&self, state: &BreakoutState, ctx: &StrategyContext) -> Decision<BreakoutState> {
        let mut next = self.reconcile(state, ctx);

        let required = self.config.closes_required();
        if ctx.candles.len() < required {
            debug!(
                symbol = %ctx.symbol,
                required,
                available = ctx.candles.len(),
                "Insufficient history, skipping cycle"
            );
            return Decision::hold(next);
        }

        self.apply_lookback(&mut next, ctx);

        if ctx.candles.len() < next.lookback {
            debug!(
                symbol = %ctx.symbol,
                lookback = next.lookback,
                available = ctx.candles.len(),
                "Breakout window incomplete, skipping cycle"
            );
            return Decision::hold(next);
        }

        let mut actions = Vec::new();

        if next.is_flat() {
            let highs: Vec<f64> = ctx.candles[ctx.candles.len() - next.lookback..]
                .iter()
                .map(|c| c.high)
                .collect();

            if let Some(breakout_level) = detect_breakout(ctx.invested, ctx.close, &highs) {
                info!(
                    symbol = %ctx.symbol,
                    close = ctx.close,
                    breakout_level,
                    lookback = next.lookback,
                    "Breakout, entering full position"
                );
                actions.push(Action::SetHoldings {
                    symbol: ctx.symbol.clone(),
                    fraction: 1.0,
                });
                next.phase = Phase::Entering { breakout_level };
            }
        }

        let managed = self.manage_position(&next, ctx);
        actions.extend(managed.actions);

        Decision {
            state: managed.state,
            actions,
        }
    }

    fn manage_position(
        &self,
        state: &BreakoutState,
        ctx: &StrategyContext,
    ) -> Decision<BreakoutState> {
        if !ctx.invested {
            return Decision::hold(state.clone());
        }

        let mut holding = match &state.phase {
            Phase::Entering { breakout_level } => {
                info!(
                    symbol = %ctx.symbol,
                    quantity = ctx.quantity,
                    breakout_level,
                    "Entry filled"
                );
                Holding::new(*breakout_level)
            }
            Phase::Invested(holding) => holding.clone(),
            Phase::Flat => return Decision::hold(state.clone()),
        };

        let mut actions = Vec::new();
        let initial_stop = initial_stop_price(holding.breakout_level, self.config.initial_stop_risk);

        if ctx.open_orders.is_empty() {
            // Never place below a stop that was confirmed or already decided
            let mut stop_price = holding.target_stop(initial_stop);
            if let Some(update) = trail(
                holding.high_water(),
                stop_price,
                ctx.close,
                self.config.trailing_stop_risk,
            ) {
                holding.pending = Some(update);
                stop_price = update.stop_price;
            }
            holding.stop_order = None;

            if ctx.quantity > 0.0 {
                info!(
                    symbol = %ctx.symbol,
                    quantity = ctx.quantity,
                    stop_price,
                    "Placing protective stop"
                );
                actions.push(Action::PlaceStop {
                    symbol: ctx.symbol.clone(),
                    quantity: ctx.quantity,
                    stop_price,
                });
            } else {
                warn!(symbol = %ctx.symbol, quantity = ctx.quantity, "Nothing to protect");
            }
        } else {
            if ctx.open_orders.len() > 1 {
                warn!(
                    symbol = %ctx.symbol,
                    open_orders = ctx.open_orders.len(),
                    "More than one open order for a single position"
                );
            }

            let order = holding
                .stop_order
                .filter(|id| ctx.open_orders.contains(id))
                .unwrap_or(ctx.open_orders[0]);
            if holding.stop_order != Some(order) {
                debug!(symbol = %ctx.symbol, order, "Tracking open stop order");
                holding.stop_order = Some(order);
            }

            let current_stop = holding.stop_price.unwrap_or(initial_stop);
            let target = holding.target_stop(initial_stop);
            if let Some(update) = trail(
                holding.high_water(),
                target,
                ctx.close,
                self.config.trailing_stop_risk,
            ) {
                info!(
                    symbol = %ctx.symbol,
                    close = ctx.close,
                    from = current_stop,
                    to = update.stop_price,
                    "Trailing stop raised"
                );
                holding.pending = Some(update);
                actions.push(Action::UpdateStop {
                    order,
                    stop_price: update.stop_price,
                });
            } else if target > current_stop {
                info!(
                    symbol = %ctx.symbol,
                    from = current_stop,
                    to = target,
                    "Retrying unconfirmed stop raise"
                );
                actions.push(Action::UpdateStop {
                    order,
                    stop_price: target,
                });
            } else {
                debug!(symbol = %ctx.symbol, stop_price = current_stop, "Stop unchanged");
            }
        }

        Decision {
            state: BreakoutState {
                lookback: state.lookback,
                phase: Phase::Invested(holding),
            },
            actions,
        }
    }

    fn on_action_result(
        &self,
        mut state: BreakoutState,
        action: &Action,
        outcome: &ActionOutcome,
    ) -> BreakoutState {
        match (action, outcome) {
            (Action::SetHoldings { symbol, .. }, ActionOutcome::Failed(err)) => {
                warn!(%symbol, error = %err, "Entry rejected, staying flat");
                if matches!(state.phase, Phase::Entering { .. }) {
                    state.phase = Phase::Flat;
                }
            }
            (Action::PlaceStop { stop_price, .. }, ActionOutcome::Placed(order)) => {
                if let Phase::Invested(holding) = &mut state.phase {
                    holding.confirm_stop(*order, *stop_price);
                }
            }
            (Action::PlaceStop { symbol, stop_price, .. }, ActionOutcome::Failed(err)) => {
                warn!(
                    %symbol,
                    stop_price,
                    error = %err,
                    "Stop placement failed, retrying next cycle"
                );
            }
            (Action::UpdateStop { order, stop_price }, ActionOutcome::Accepted) => {
                if let Phase::Invested(holding) = &mut state.phase {
                    holding.confirm_stop(*order, *stop_price);
                }
            }
            (Action::UpdateStop { order, stop_price }, ActionOutcome::Failed(err)) => {
                warn!(
                    order,
                    stop_price,
                    error = %err,
                    "Stop update failed, keeping previous stop"
                );
            }
            _ => {}
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::oms::OrderId;
    use crate::{Candle, Symbol};
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn candles_from(closes: &[f64], highs: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .zip(highs)
            .enumerate()
            .map(|(i, (&close, &high))| {
                Candle::new_unchecked(
                    start + Duration::days(i as i64),
                    close,
                    high.max(close),
                    close * 0.99,
                    close,
                    1000.0,
                )
            })
            .collect()
    }

    /// 31 bars with alternating closes (non-zero, stable volatility) and a
    /// flat 100 high, so the breakout level is 100 whatever the lookback
    fn flat_market() -> Vec<Candle> {
        let closes: Vec<f64> = (0..31).map(|i| if i % 2 == 0 { 95.0 } else { 96.0 }).collect();
        let highs = vec![100.0; 31];
        candles_from(&closes, &highs)
    }

    fn ctx<'a>(
        symbol: &'a Symbol,
        candles: &'a [Candle],
        close: f64,
        invested: bool,
        open_orders: &'a [OrderId],
    ) -> StrategyContext<'a> {
        StrategyContext {
            symbol,
            candles,
            close,
            invested,
            quantity: if invested { 10.0 } else { 0.0 },
            open_orders,
            timestamp: Utc::now(),
        }
    }

    fn invested_state(stop_order: Option<OrderId>, stop_price: Option<f64>) -> BreakoutState {
        BreakoutState {
            lookback: 20,
            phase: Phase::Invested(Holding {
                breakout_level: 100.0,
                highest_price: 100.0,
                stop_order,
                stop_price,
                pending: None,
            }),
        }
    }

    #[test]
    fn test_breakout_enters_full_position() {
        let strategy = AdaptiveBreakoutStrategy::new(AdaptiveBreakoutConfig::default());
        let symbol = Symbol::new("BTC");
        let candles = flat_market();

        let decision = strategy.on_cycle(
            &strategy.initial_state(),
            &ctx(&symbol, &candles, 100.0, false, &[]),
        );

        assert_eq!(
            decision.actions,
            vec![Action::SetHoldings {
                symbol: symbol.clone(),
                fraction: 1.0
            }]
        );
        assert_eq!(
            decision.state.phase,
            Phase::Entering {
                breakout_level: 100.0
            }
        );
    }

    #[test]
    fn test_no_entry_below_level() {
        let strategy = AdaptiveBreakoutStrategy::new(AdaptiveBreakoutConfig::default());
        let symbol = Symbol::new("BTC");
        let candles = flat_market();

        let decision = strategy.on_cycle(
            &strategy.initial_state(),
            &ctx(&symbol, &candles, 99.5, false, &[]),
        );

        assert!(decision.actions.is_empty());
        assert!(decision.state.is_flat());
    }

    #[test]
    fn test_short_history_is_noop() {
        let strategy = AdaptiveBreakoutStrategy::new(AdaptiveBreakoutConfig::default());
        let symbol = Symbol::new("BTC");
        let candles = flat_market()[..20].to_vec();

        let decision = strategy.on_cycle(
            &strategy.initial_state(),
            &ctx(&symbol, &candles, 500.0, false, &[]),
        );

        assert!(decision.actions.is_empty());
        assert_eq!(decision.state, strategy.initial_state());
    }

    #[test]
    fn test_zero_volatility_keeps_lookback_and_still_trades() {
        let strategy = AdaptiveBreakoutStrategy::new(AdaptiveBreakoutConfig::default());
        let symbol = Symbol::new("BTC");
        let candles = candles_from(&[50.0; 31], &[50.0; 31]);

        let decision = strategy.on_cycle(
            &strategy.initial_state(),
            &ctx(&symbol, &candles, 50.0, false, &[]),
        );

        assert_eq!(decision.state.lookback, 20);
        assert_eq!(decision.actions.len(), 1);
    }

    #[test]
    fn test_entry_fill_places_initial_stop() {
        let strategy = AdaptiveBreakoutStrategy::new(AdaptiveBreakoutConfig::default());
        let symbol = Symbol::new("BTC");
        let candles = flat_market();
        let state = BreakoutState {
            lookback: 20,
            phase: Phase::Entering {
                breakout_level: 100.0,
            },
        };

        let decision = strategy.manage_position(&state, &ctx(&symbol, &candles, 100.0, true, &[]));

        match decision.actions.as_slice() {
            [Action::PlaceStop {
                quantity,
                stop_price,
                ..
            }] => {
                assert_relative_eq!(*quantity, 10.0);
                assert_relative_eq!(*stop_price, 98.0);
            }
            other => panic!("expected a single stop placement, got {:?}", other),
        }
        assert_eq!(decision.state.holding().map(|h| h.highest_price), Some(100.0));
    }

    #[test]
    fn test_trailing_scenario() {
        let strategy = AdaptiveBreakoutStrategy::new(AdaptiveBreakoutConfig::default());
        let symbol = Symbol::new("BTC");
        let candles = flat_market();
        let orders = [7];
        let state = invested_state(Some(7), Some(98.0));

        // Close rallies to 120: 120 * 0.9 = 108 > 98
        let decision = strategy.manage_position(&state, &ctx(&symbol, &candles, 120.0, true, &orders));
        assert_eq!(
            decision.actions,
            vec![Action::UpdateStop {
                order: 7,
                stop_price: 120.0 * 0.90
            }]
        );
        let state = strategy.on_action_result(
            decision.state,
            &decision.actions[0],
            &ActionOutcome::Accepted,
        );
        let holding = state.holding().unwrap();
        assert_relative_eq!(holding.highest_price, 120.0);
        assert_relative_eq!(holding.stop_price.unwrap(), 108.0);

        // Pullback to 105: nothing moves
        let decision = strategy.manage_position(&state, &ctx(&symbol, &candles, 105.0, true, &orders));
        assert!(decision.actions.is_empty());
        let holding = decision.state.holding().unwrap();
        assert_relative_eq!(holding.highest_price, 120.0);
        assert_relative_eq!(holding.stop_price.unwrap(), 108.0);
    }

    #[test]
    fn test_failed_update_keeps_confirmed_stop() {
        let strategy = AdaptiveBreakoutStrategy::new(AdaptiveBreakoutConfig::default());
        let symbol = Symbol::new("BTC");
        let candles = flat_market();
        let orders = [7];
        let state = invested_state(Some(7), Some(98.0));

        let decision = strategy.manage_position(&state, &ctx(&symbol, &candles, 120.0, true, &orders));
        let state = strategy.on_action_result(
            decision.state,
            &decision.actions[0],
            &ActionOutcome::Failed(ProviderError::UnknownOrder(7)),
        );

        assert_eq!(state.stop_price(), Some(98.0));
    }

    #[test]
    fn test_failed_placement_retries_trailed_stop() {
        let strategy = AdaptiveBreakoutStrategy::new(AdaptiveBreakoutConfig::default());
        let symbol = Symbol::new("BTC");
        let candles = flat_market();
        let state = invested_state(None, Some(98.0));

        let decision = strategy.manage_position(&state, &ctx(&symbol, &candles, 120.0, true, &[]));
        assert_eq!(
            decision.actions,
            vec![Action::PlaceStop {
                symbol: symbol.clone(),
                quantity: 10.0,
                stop_price: 120.0 * 0.90
            }]
        );
        let state = strategy.on_action_result(
            decision.state,
            &decision.actions[0],
            &ActionOutcome::Failed(ProviderError::Rejected {
                symbol: symbol.clone(),
                reason: "broker offline".to_string(),
            }),
        );
        let holding = state.holding().unwrap();
        assert_relative_eq!(holding.highest_price, 100.0);
        assert_eq!(holding.stop_price, Some(98.0));

        // Pullback to 115: the retry keeps the 108 decided at 120
        let decision = strategy.manage_position(&state, &ctx(&symbol, &candles, 115.0, true, &[]));
        match decision.actions.as_slice() {
            [Action::PlaceStop { stop_price, .. }] => assert_relative_eq!(*stop_price, 108.0),
            other => panic!("expected a single stop placement, got {:?}", other),
        }

        let state = strategy.on_action_result(
            decision.state,
            &decision.actions[0],
            &ActionOutcome::Placed(3),
        );
        let holding = state.holding().unwrap();
        assert_relative_eq!(holding.highest_price, 120.0);
        assert_relative_eq!(holding.stop_price.unwrap(), 108.0);
        assert_eq!(holding.stop_order, Some(3));
        assert!(holding.pending.is_none());
    }

    #[test]
    fn test_failed_update_is_retried() {
        let strategy = AdaptiveBreakoutStrategy::new(AdaptiveBreakoutConfig::default());
        let symbol = Symbol::new("BTC");
        let candles = flat_market();
        let orders = [7];
        let state = invested_state(Some(7), Some(98.0));

        let decision = strategy.manage_position(&state, &ctx(&symbol, &candles, 120.0, true, &orders));
        let state = strategy.on_action_result(
            decision.state,
            &decision.actions[0],
            &ActionOutcome::Failed(ProviderError::UnknownOrder(7)),
        );

        let decision = strategy.manage_position(&state, &ctx(&symbol, &candles, 115.0, true, &orders));
        match decision.actions.as_slice() {
            [Action::UpdateStop { order: 7, stop_price }] => {
                assert_relative_eq!(*stop_price, 108.0)
            }
            other => panic!("expected a single stop update, got {:?}", other),
        }
    }

    #[test]
    fn test_stop_fill_resets_to_flat() {
        let strategy = AdaptiveBreakoutStrategy::new(AdaptiveBreakoutConfig::default());
        let symbol = Symbol::new("BTC");
        let candles = flat_market();
        let state = invested_state(Some(7), Some(98.0));

        // Provider reports flat and the close is below the breakout level
        let decision = strategy.on_cycle(&state, &ctx(&symbol, &candles, 90.0, false, &[]));

        assert!(decision.state.is_flat());
        assert!(decision.actions.is_empty());
    }

    #[test]
    fn test_missing_stop_is_replaced_without_loosening() {
        let strategy = AdaptiveBreakoutStrategy::new(AdaptiveBreakoutConfig::default());
        let symbol = Symbol::new("BTC");
        let candles = flat_market();
        let mut state = invested_state(Some(7), Some(108.0));
        if let Phase::Invested(h) = &mut state.phase {
            h.highest_price = 120.0;
        }

        let decision = strategy.manage_position(&state, &ctx(&symbol, &candles, 115.0, true, &[]));

        assert_eq!(
            decision.actions,
            vec![Action::PlaceStop {
                symbol,
                quantity: 10.0,
                stop_price: 108.0
            }]
        );
    }

    #[test]
    fn test_adopts_unknown_open_order() {
        let strategy = AdaptiveBreakoutStrategy::new(AdaptiveBreakoutConfig::default());
        let symbol = Symbol::new("BTC");
        let candles = flat_market();
        let orders = [42];
        let state = invested_state(None, None);

        let decision = strategy.manage_position(&state, &ctx(&symbol, &candles, 101.0, true, &orders));

        assert!(decision.actions.is_empty());
        assert_eq!(decision.state.holding().and_then(|h| h.stop_order), Some(42));
    }

    #[test]
    fn test_rejected_entry_returns_to_flat() {
        let strategy = AdaptiveBreakoutStrategy::new(AdaptiveBreakoutConfig::default());
        let symbol = Symbol::new("BTC");
        let state = BreakoutState {
            lookback: 20,
            phase: Phase::Entering {
                breakout_level: 100.0,
            },
        };
        let action = Action::SetHoldings {
            symbol: symbol.clone(),
            fraction: 1.0,
        };

        let state = strategy.on_action_result(
            state,
            &action,
            &ActionOutcome::Failed(ProviderError::Rejected {
                symbol,
                reason: "insufficient cash".to_string(),
            }),
        );

        assert!(state.is_flat());
    }
}
