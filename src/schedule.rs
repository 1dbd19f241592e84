//! Daily trigger schedule
//!
//! The routine runs once per trading day, a fixed number of minutes after
//! the session open. Trading days are the days the data feed has bars for.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use crate::config::ScheduleConfig;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketSchedule {
    market_open: NaiveTime,
    offset: Duration,
}

impl MarketSchedule {
    pub fn new(market_open: NaiveTime, offset_minutes: i64) -> Self {
        Self {
            market_open,
            offset: Duration::minutes(offset_minutes),
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self, ConfigError> {
        let market_open = NaiveTime::parse_from_str(&config.market_open, "%H:%M")
            .map_err(|_| ConfigError::InvalidMarketOpen(config.market_open.clone()))?;
        Ok(Self::new(market_open, config.offset_minutes))
    }

    pub fn market_open(&self) -> NaiveTime {
        self.market_open
    }

    /// Instant the routine fires on `date`
    pub fn trigger_at(&self, date: NaiveDate) -> DateTime<Utc> {
        date.and_time(self.market_open).and_utc() + self.offset
    }

    /// First trigger at or after `instant`
    pub fn next_trigger(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let same_day = self.trigger_at(instant.date_naive());
        if same_day >= instant {
            same_day
        } else {
            same_day + Duration::days(1)
        }
    }
}

impl Default for MarketSchedule {
    fn default() -> Self {
        Self::new(NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(), 20)
    }
}
