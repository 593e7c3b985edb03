//! Trading-session clock arithmetic.
//!
//! Two sessions per trading day (09:30-11:30, 13:00-15:00 local). Weekends
//! are the only non-trading days modeled; exchange holidays come from the
//! upstream calendar and are out of scope here.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::config::TradingHoursConfig;

#[derive(Debug, Clone, Copy)]
pub struct TradingCalendar {
    hours: TradingHoursConfig,
    /// Start of the pre-close window used by seconds_to_close.
    day_start: NaiveTime,
}

impl Default for TradingCalendar {
    fn default() -> Self {
        Self::new(TradingHoursConfig::default())
    }
}

impl TradingCalendar {
    pub fn new(hours: TradingHoursConfig) -> Self {
        Self {
            hours,
            day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        }
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Inside either session of a trading day.
    pub fn is_trading_time(&self, now: NaiveDateTime) -> bool {
        if !self.is_trading_day(now.date()) {
            return false;
        }
        let t = now.time();
        (t >= self.hours.morning_open && t < self.hours.morning_close)
            || (t >= self.hours.afternoon_open && t < self.hours.afternoon_close)
    }

    /// Seconds until the 15:00 close, counted from anywhere inside the
    /// trading day window (09:00-15:00). None outside it.
    pub fn seconds_to_close(&self, now: NaiveDateTime) -> Option<i64> {
        if !self.is_trading_day(now.date()) {
            return None;
        }
        let t = now.time();
        if t < self.day_start || t >= self.hours.afternoon_close {
            return None;
        }
        let close = now.date().and_time(self.hours.afternoon_close);
        Some((close - now).num_seconds())
    }

    /// Next session open strictly after `now`.
    pub fn next_open(&self, now: NaiveDateTime) -> NaiveDateTime {
        let t = now.time();
        if self.is_trading_day(now.date()) {
            if t < self.hours.morning_open {
                return now.date().and_time(self.hours.morning_open);
            }
            if t >= self.hours.morning_close && t < self.hours.afternoon_open {
                return now.date().and_time(self.hours.afternoon_open);
            }
            if t < self.hours.morning_close || t < self.hours.afternoon_close {
                // Already inside a session; the session itself is "open now".
                return now;
            }
        }
        let mut date = now.date() + Duration::days(1);
        while !self.is_trading_day(date) {
            date += Duration::days(1);
        }
        date.and_time(self.hours.morning_open)
    }

    /// Trading dates in [start, end], inclusive.
    pub fn trading_dates(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut date = start;
        while date <= end {
            if self.is_trading_day(date) {
                dates.push(date);
            }
            date += Duration::days(1);
        }
        dates
    }

    /// Intraday bar timestamps for a date at a fixed minute step, covering
    /// both sessions, bar at session start, none at session end.
    pub fn intraday_bars(&self, date: NaiveDate, step_minutes: i64) -> Vec<NaiveDateTime> {
        let mut bars = Vec::new();
        for (open, close) in [
            (self.hours.morning_open, self.hours.morning_close),
            (self.hours.afternoon_open, self.hours.afternoon_close),
        ] {
            let mut t = date.and_time(open);
            let end = date.and_time(close);
            while t < end {
                bars.push(t);
                t += Duration::minutes(step_minutes);
            }
        }
        bars
    }
}
