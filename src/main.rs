//! Adaptive breakout - main entry point
//!
//! Runs the volatility-adjusted breakout strategy over historical daily bars.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "adaptive-breakout")]
#[command(about = "Volatility-adjusted breakout strategy with a ratcheting trailing stop", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run strategy backtest
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/btc_breakout_1d.json")]
        config: String,

        /// Symbol (overrides config file)
        #[arg(short, long)]
        symbol: Option<String>,

        /// Initial capital
        #[arg(long)]
        capital: Option<f64>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // Same format, no colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Backtest { .. } => "backtest",
    };
    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Backtest {
            config,
            symbol,
            capital,
            start,
            end,
        } => commands::backtest::run(config, symbol, capital, start, end),
    }
}
