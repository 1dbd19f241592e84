//! Backtest command implementation

use adaptive_breakout::strategies;
use adaptive_breakout::{backtest::Backtester, data, Config};
use anyhow::Result;
use tracing::{debug, info};

pub fn run(
    config_path: String,
    symbol_override: Option<String>,
    capital_override: Option<f64>,
    start_override: Option<String>,
    end_override: Option<String>,
) -> Result<()> {
    info!("Starting backtest");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(symbol) = symbol_override {
        info!("Overriding symbol to: {}", symbol);
        config.symbol = symbol;
    }

    if let Some(capital) = capital_override {
        info!("Overriding initial capital to: ${:.2}", capital);
        config.backtest.initial_capital = capital;
    }

    if let Some(start) = start_override {
        data::parse_date(&start)?;
        config.backtest.start_date = Some(start);
    }

    if let Some(end) = end_override {
        data::parse_date(&end)?;
        config.backtest.end_date = Some(end);
    }

    let symbol = config.symbol();
    info!("Loading data from: {}", config.backtest.data_dir);
    let candles = data::load_symbol(&config.backtest.data_dir, &symbol, &config.backtest.timeframe)?;
    debug!(
        "Data range: {:?} to {:?}",
        candles.first().map(|c| c.datetime),
        candles.last().map(|c| c.datetime)
    );

    info!("Creating strategy: {}", config.strategy_name);
    let strategy = strategies::create_strategy(&config)?;
    debug!("Strategy parameters: {:?}", strategy.config());

    let backtester = Backtester::new(config.clone(), strategy)?;

    info!("Running backtest...");
    let result = backtester.run(candles)?;

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS: {}", symbol);
    println!("{}", "=".repeat(60));
    println!("Initial Capital:    ${:.2}", config.backtest.initial_capital);
    println!(
        "Final Equity:       ${:.2}",
        result
            .equity_curve
            .last()
            .map_or(config.backtest.initial_capital, |(_, e)| *e)
    );
    println!("Total Return:       {:.2}%", result.metrics.total_return);
    println!("Sharpe Ratio:       {:.2}", result.metrics.sharpe_ratio);
    println!("Max Drawdown:       {:.2}%", result.metrics.max_drawdown);
    println!("Win Rate:           {:.2}%", result.metrics.win_rate);
    println!("Profit Factor:      {:.2}", result.metrics.profit_factor);
    println!("Total Trades:       {}", result.metrics.total_trades);
    println!("Winning Trades:     {}", result.metrics.winning_trades);
    println!("Losing Trades:      {}", result.metrics.losing_trades);
    println!("Average Win:        ${:.2}", result.metrics.avg_win);
    println!("Average Loss:       ${:.2}", result.metrics.avg_loss);
    println!("Largest Win:        ${:.2}", result.metrics.largest_win);
    println!("Largest Loss:       ${:.2}", result.metrics.largest_loss);
    println!("{}", "-".repeat(60));
    println!(
        "Total Commission:   ${:.2}",
        result.metrics.total_commission
    );
    println!("{}", "=".repeat(60));

    result.export(&config.backtest.results_dir)?;
    info!("Backtest completed successfully");

    Ok(())
}
