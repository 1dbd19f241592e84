//! Backtesting engine
//!
//! Replays daily bars through the daily routine against the simulated
//! broker. Bars before `start_date` only serve as warmup history. A bar is
//! traded at the first trigger after it closes, so a cycle never sees a
//! close from its own future.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::data::parse_date;
use crate::error::{ProviderError, ProviderResult};
use crate::oms::SimBroker;
use crate::providers::HistoryProvider;
use crate::runner::DailyRoutine;
use crate::strategies::adaptive_breakout::AdaptiveBreakoutStrategy;
use crate::{Candle, Config, PerformanceMetrics, Resolution, Symbol, Trade};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// History provider over a loaded series. Only bars up to the cursor are
/// visible.
pub struct ReplayFeed {
    symbol: Symbol,
    resolution: Resolution,
    candles: Vec<Candle>,
    cursor: usize,
}

impl ReplayFeed {
    pub fn new(symbol: Symbol, resolution: Resolution, candles: Vec<Candle>) -> Self {
        Self {
            symbol,
            resolution,
            candles,
            cursor: 0,
        }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// Make bar `index` the latest visible bar
    pub fn advance_to(&mut self, index: usize) {
        self.cursor = index.min(self.candles.len().saturating_sub(1));
    }
}

impl HistoryProvider for ReplayFeed {
    fn history(
        &self,
        symbol: &Symbol,
        n: usize,
        resolution: Resolution,
    ) -> ProviderResult<Vec<Candle>> {
        if symbol != &self.symbol {
            return Err(ProviderError::HistoryUnavailable {
                symbol: symbol.clone(),
                reason: format!("feed only replays {}", self.symbol),
            });
        }
        if resolution != self.resolution {
            return Err(ProviderError::HistoryUnavailable {
                symbol: symbol.clone(),
                reason: format!("feed resolution is {}, requested {}", self.resolution, resolution),
            });
        }
        if self.candles.is_empty() {
            return Ok(Vec::new());
        }

        let end = self.cursor + 1;
        let start = end.saturating_sub(n);
        Ok(self.candles[start..end].to_vec())
    }
}

/// Per-bar series for plotting price against the trailing stop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartPoint {
    pub datetime: DateTime<Utc>,
    /// Trigger the routine ran at for this bar
    pub cycle_time: DateTime<Utc>,
    pub close: f64,
    pub stop_price: Option<f64>,
    pub lookback: usize,
    pub equity: f64,
}

pub struct Backtester {
    config: Config,
    routine: DailyRoutine<AdaptiveBreakoutStrategy>,
}

impl Backtester {
    pub fn new(config: Config, strategy: AdaptiveBreakoutStrategy) -> Result<Self> {
        let resolution: Resolution = config.backtest.timeframe.parse()?;
        let routine = DailyRoutine::new(strategy, config.symbol()).with_resolution(resolution);
        Ok(Self { config, routine })
    }

    pub fn run(&self, candles: Vec<Candle>) -> Result<BacktestResult> {
        let bt = &self.config.backtest;
        let start = bt.start_date.as_deref().map(parse_date).transpose()?;
        let end = bt.end_date.as_deref().map(parse_date).transpose()?;
        let schedule = self.config.schedule()?;
        let resolution = self.routine.resolution();
        let symbol = self.routine.symbol().clone();

        let mut feed = ReplayFeed::new(symbol.clone(), resolution, candles);
        let mut broker = SimBroker::new(symbol.clone(), bt.initial_capital, bt.commission, bt.slippage);
        let mut state = self.routine.initial_state();

        let mut trades: Vec<Trade> = Vec::new();
        let mut equity_curve: Vec<(DateTime<Utc>, f64)> = Vec::new();
        let mut chart: Vec<ChartPoint> = Vec::new();

        info!(
            "Running backtest for {} over {} bars (start={:?}, end={:?})",
            symbol,
            feed.candles().len(),
            start.map(|d| d.format("%Y-%m-%d").to_string()),
            end.map(|d| d.format("%Y-%m-%d").to_string())
        );

        for index in 0..feed.candles().len() {
            let candle = feed.candles()[index].clone();
            if start.is_some_and(|s| candle.datetime < s) {
                continue;
            }
            if end.is_some_and(|e| candle.datetime > e) {
                break;
            }

            feed.advance_to(index);
            broker.on_bar(&candle);

            let trigger = schedule.next_trigger(candle.datetime + resolution.bar_duration());
            let report = self.routine.run_cycle(&state, &feed, &mut broker, trigger);
            state = report.state;

            trades.extend(broker.take_closed_trades());
            let equity = broker.equity();
            equity_curve.push((candle.datetime, equity));
            chart.push(ChartPoint {
                datetime: candle.datetime,
                cycle_time: trigger,
                close: candle.close,
                stop_price: state.stop_price(),
                lookback: state.lookback,
                equity,
            });
        }

        if broker.close_position("End of backtest").is_some() {
            trades.extend(broker.take_closed_trades());
            if let Some(last) = equity_curve.last_mut() {
                last.1 = broker.equity();
            }
        }

        let metrics = calculate_metrics(&trades, &equity_curve, bt.initial_capital);
        info!(
            "Backtest complete: {} trades, return {:.2}%, max drawdown {:.2}%",
            metrics.total_trades, metrics.total_return, metrics.max_drawdown
        );

        Ok(BacktestResult {
            trades,
            equity_curve,
            chart,
            metrics,
        })
    }
}

pub fn calculate_metrics(
    trades: &[Trade],
    equity_curve: &[(DateTime<Utc>, f64)],
    initial_capital: f64,
) -> PerformanceMetrics {
    let Some(&(_, final_capital)) = equity_curve.last() else {
        return PerformanceMetrics::default();
    };

    let total_return = ((final_capital - initial_capital) / initial_capital) * 100.0;
    let total_commission: f64 = trades.iter().map(|t| t.commission).sum();

    let winning_trades: Vec<&Trade> = trades.iter().filter(|t| t.net_pnl > 0.0).collect();
    let losing_trades: Vec<&Trade> = trades.iter().filter(|t| t.net_pnl <= 0.0).collect();

    let win_rate = if !trades.is_empty() {
        (winning_trades.len() as f64 / trades.len() as f64) * 100.0
    } else {
        0.0
    };

    let gross_profits: f64 = winning_trades.iter().map(|t| t.net_pnl).sum();
    let gross_losses: f64 = losing_trades.iter().map(|t| t.net_pnl.abs()).sum();

    let profit_factor = if gross_losses > 0.0 {
        gross_profits / gross_losses
    } else if gross_profits > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let avg_win = if !winning_trades.is_empty() {
        gross_profits / winning_trades.len() as f64
    } else {
        0.0
    };

    let avg_loss = if !losing_trades.is_empty() {
        gross_losses / losing_trades.len() as f64
    } else {
        0.0
    };

    let largest_win = winning_trades.iter().map(|t| t.net_pnl).fold(0.0, f64::max);
    let largest_loss = losing_trades.iter().map(|t| t.net_pnl).fold(0.0, f64::min);

    let mut peak = initial_capital;
    let mut max_dd = 0.0;
    for (_, equity) in equity_curve {
        if *equity > peak {
            peak = *equity;
        }
        let dd = (peak - equity) / peak;
        if dd > max_dd {
            max_dd = dd;
        }
    }

    // Daily returns, annualised over US equity trading days
    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| (w[1].1 - w[0].1) / w[0].1)
        .collect();
    let sharpe_ratio = if returns.len() > 1 {
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std_dev = variance.sqrt();
        if std_dev > 0.0 {
            mean / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
        } else {
            0.0
        }
    } else {
        0.0
    };

    PerformanceMetrics {
        total_return,
        sharpe_ratio,
        max_drawdown: max_dd * 100.0,
        win_rate,
        profit_factor,
        total_trades: trades.len(),
        winning_trades: winning_trades.len(),
        losing_trades: losing_trades.len(),
        avg_win,
        avg_loss,
        largest_win,
        largest_loss,
        total_commission,
    }
}

#[derive(Debug, Default)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
    pub chart: Vec<ChartPoint>,
    pub metrics: PerformanceMetrics,
}

impl BacktestResult {
    /// Write `trades.csv`, `chart.csv` and `metrics.json` into `dir`
    pub fn export(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut writer = csv::Writer::from_path(dir.join("trades.csv"))
            .context("Failed to create trades.csv")?;
        for trade in &self.trades {
            writer.serialize(trade)?;
        }
        writer.flush()?;

        let mut writer = csv::Writer::from_path(dir.join("chart.csv"))
            .context("Failed to create chart.csv")?;
        for point in &self.chart {
            writer.serialize(point)?;
        }
        writer.flush()?;

        let metrics = serde_json::to_string_pretty(&self.metrics)?;
        std::fs::write(dir.join("metrics.json"), metrics).context("Failed to write metrics.json")?;

        info!("Results exported to {}", dir.display());
        Ok(())
    }
}
