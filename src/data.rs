//! Data loading
//!
//! Loads OHLCV bars from CSV files named `{SYMBOL}_{timeframe}.csv`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Candle, Symbol};

/// Load OHLCV data from CSV file with validation
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).context("Failed to open CSV file")?;

    let mut candles = Vec::new();
    let mut invalid_count = 0;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let datetime = parse_date(dt_str)?;

        let field = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .context(format!("Missing {} column", name))?
                .trim()
                .parse::<f64>()
                .context(format!("Failed to parse {}", name))
        };

        let open = field(1, "open")?;
        let high = field(2, "high")?;
        let low = field(3, "low")?;
        let close = field(4, "close")?;
        let volume = field(5, "volume")?;

        match Candle::new(datetime, open, high, low, close, volume) {
            Ok(candle) => candles.push(candle),
            Err(e) => {
                invalid_count += 1;
                warn!(
                    "Skipping invalid candle at row {} in {:?}: {}",
                    row_idx + 2, // +2 for 1-indexed and header row
                    path.file_name().unwrap_or_default(),
                    e
                );
            }
        }
    }

    if invalid_count > 0 {
        warn!(
            "Skipped {} invalid candles out of {} in {:?}",
            invalid_count,
            invalid_count + candles.len(),
            path.file_name().unwrap_or_default()
        );
    }

    candles.sort_by_key(|c| c.datetime);
    Ok(candles)
}

/// Filter candles by date range
pub fn filter_candles_by_date(
    candles: Vec<Candle>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Vec<Candle> {
    candles
        .into_iter()
        .filter(|c| {
            let after_start = start.is_none_or(|s| c.datetime >= s);
            let before_end = end.is_none_or(|e| c.datetime <= e);
            after_start && before_end
        })
        .collect()
}

/// Parse a date string (RFC 3339, YYYY-MM-DD HH:MM:SS or YYYY-MM-DD) to DateTime<Utc>
pub fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    let date_str = date_str.trim();

    if let Ok(dt) = date_str.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }

    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(date_str, "%Y-%m-%d %H:%M:%S") {
        return Ok(ndt.and_utc());
    }

    if let Ok(nd) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        let ndt = nd.and_hms_opt(0, 0, 0).context("Invalid start of day")?;
        return Ok(ndt.and_utc());
    }

    anyhow::bail!(
        "Failed to parse date: {}. Use YYYY-MM-DD or YYYY-MM-DD HH:MM:SS format",
        date_str
    )
}

/// Path of the CSV file for one symbol and timeframe
pub fn data_path(data_dir: impl AsRef<Path>, symbol: &Symbol, timeframe: &str) -> PathBuf {
    data_dir
        .as_ref()
        .join(format!("{}_{}.csv", symbol.as_str(), timeframe))
}

/// Load all bars for one symbol
pub fn load_symbol(
    data_dir: impl AsRef<Path>,
    symbol: &Symbol,
    timeframe: &str,
) -> Result<Vec<Candle>> {
    let path = data_path(data_dir, symbol, timeframe);
    let candles =
        load_csv(&path).with_context(|| format!("Failed to load data from {}", path.display()))?;
    info!("Loaded {} candles for {} from {}", candles.len(), symbol, path.display());
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "datetime,open,high,low,close,volume").unwrap();
        for row in rows {
            writeln!(file, "{}", row).unwrap();
        }
        path
    }

    #[test]
    fn test_load_csv_skips_invalid_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "BTC_1d.csv",
            &[
                "2021-01-02,101,105,100,104,10",
                "2021-01-01,100,102,99,101,10",
                // high below low
                "2021-01-03,100,90,95,92,10",
            ],
        );

        let candles = load_csv(&path).unwrap();
        assert_eq!(candles.len(), 2);
        // Sorted oldest first
        assert_eq!(
            candles[0].datetime,
            Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(candles[1].close, 104.0);
    }

    #[test]
    fn test_load_symbol_uses_naming_convention() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "SPY_1d.csv",
            &["2021-01-01 00:00:00,100,102,99,101,10"],
        );

        let candles = load_symbol(dir.path(), &Symbol::new("SPY"), "1d").unwrap();
        assert_eq!(candles.len(), 1);
        assert!(load_symbol(dir.path(), &Symbol::new("QQQ"), "1d").is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = Utc.with_ymd_and_hms(2021, 10, 28, 0, 0, 0).unwrap();
        assert_eq!(parse_date("2021-10-28").unwrap(), expected);
        assert_eq!(parse_date("2021-10-28 00:00:00").unwrap(), expected);
        assert_eq!(parse_date("2021-10-28T00:00:00Z").unwrap(), expected);
        assert!(parse_date("28/10/2021").is_err());
    }

    #[test]
    fn test_filter_candles_by_date() {
        let start = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let candles: Vec<Candle> = (0..10)
            .map(|i| {
                Candle::new_unchecked(
                    start + chrono::Duration::days(i),
                    100.0,
                    101.0,
                    99.0,
                    100.0,
                    1.0,
                )
            })
            .collect();

        let filtered = filter_candles_by_date(
            candles,
            Some(start + chrono::Duration::days(2)),
            Some(start + chrono::Duration::days(4)),
        );
        assert_eq!(filtered.len(), 3);
    }
}
