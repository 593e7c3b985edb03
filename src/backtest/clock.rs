//! Simulated clock for backtests.
//!
//! The pipeline never reads wall time during a replay: every bar carries
//! its own timestamp and the engine is handed that value as "now".

use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::market::TradingCalendar;

/// Daily-granularity bars are pinned mid-morning so time-based filters see
/// a session with plenty of runway.
const DAILY_BAR_TIME: (u32, u32) = (10, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "5m")]
    FiveMinute,
}

impl Default for Granularity {
    fn default() -> Self {
        Granularity::Daily
    }
}

/// The full, precomputed bar sequence of a replay window.
#[derive(Debug, Clone)]
pub struct SimClock {
    bars: Vec<NaiveDateTime>,
    dates: Vec<NaiveDate>,
}

impl SimClock {
    /// Resolve the bar sequence. Fails fast when the window contains no
    /// trading dates.
    pub fn new(
        calendar: &TradingCalendar,
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
    ) -> Result<Self> {
        let dates = calendar.trading_dates(start, end);
        if dates.is_empty() {
            bail!("no trading dates between {} and {}", start, end);
        }

        let mut bars = Vec::new();
        for &date in &dates {
            match granularity {
                Granularity::Daily => {
                    let (h, m) = DAILY_BAR_TIME;
                    bars.push(date.and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap()));
                }
                Granularity::FiveMinute => bars.extend(calendar.intraday_bars(date, 5)),
            }
        }
        Ok(Self { bars, dates })
    }

    pub fn bars(&self) -> &[NaiveDateTime] {
        &self.bars
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Bars of one date, in order.
    pub fn bars_on(&self, date: NaiveDate) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.bars.iter().copied().filter(move |b| b.date() == date)
    }
}
