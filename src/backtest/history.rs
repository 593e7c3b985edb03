//! Historical data adapters for replays.
//!
//! `HistoricalQuoteSource` implements the live `QuoteProvider` seam over
//! preloaded daily bars, pinned to the bar under replay. `HoldingsTimeline`
//! reconstructs per-date ETF holdings from quarterly snapshots by linear or
//! step interpolation.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::market::board;
use crate::market::provider::{DailyBar, HoldingsProvider, QuoteProvider};
use crate::market::TradingCalendar;
use crate::models::{EtfHoldings, Holding, Quote};

/// Daily bars carry no order book; the seal proxy keeps the order factor
/// deterministic across reruns.
const SEAL_PROXY_RATIO: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Linear,
    Step,
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::Step
    }
}

/// Quote provider over preloaded daily bars. `set_now` pins the timestamp
/// every synthesized quote carries; the driver advances it bar by bar.
pub struct HistoricalQuoteSource {
    bars: HashMap<String, BTreeMap<NaiveDate, DailyBar>>,
    now: RwLock<NaiveDateTime>,
}

impl HistoricalQuoteSource {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            bars: HashMap::new(),
            now: RwLock::new(start),
        }
    }

    pub fn load_bars(&mut self, code: &str, bars: Vec<DailyBar>) {
        let by_date = bars.into_iter().map(|b| (b.date, b)).collect();
        self.bars.insert(code.to_string(), by_date);
    }

    pub fn set_now(&self, now: NaiveDateTime) {
        *self.now.write() = now;
    }

    fn synthesize(&self, code: &str) -> Result<Quote> {
        let now = *self.now.read();
        let bar = self
            .bars
            .get(code)
            .and_then(|by_date| by_date.get(&now.date()))
            .with_context(|| format!("no historical bar for {} on {}", code, now.date()))?;

        let change_pct = if bar.prev_close > 0.0 {
            bar.close / bar.prev_close - 1.0
        } else {
            0.0
        };
        let mut quote = Quote {
            code: code.to_string(),
            name: code.to_string(),
            price: bar.close,
            prev_close: bar.prev_close,
            change_pct,
            volume: bar.volume,
            amount: bar.amount,
            timestamp: now,
            is_limit_up: false,
            is_limit_down: false,
            limit_time: None,
            seal_amount: bar.amount * SEAL_PROXY_RATIO,
            open_count: 0,
            is_first_limit: true,
        };
        board::derive_limit_flags(&mut quote);
        if !quote.is_limit_up {
            quote.seal_amount = 0.0;
        }
        Ok(quote)
    }
}

#[async_trait]
impl QuoteProvider for HistoricalQuoteSource {
    async fn quote(&self, code: &str) -> Result<Quote> {
        self.synthesize(code)
    }
}

/// Per-date holdings reconstruction across disclosure snapshots.
pub struct HoldingsTimeline {
    /// snapshot date -> etf_code -> snapshot
    snapshots: BTreeMap<NaiveDate, HashMap<String, EtfHoldings>>,
    calendar: TradingCalendar,
    mode: Interpolation,
}

impl HoldingsTimeline {
    pub fn new(
        snapshots: BTreeMap<NaiveDate, Vec<EtfHoldings>>,
        calendar: TradingCalendar,
        mode: Interpolation,
    ) -> Self {
        let snapshots = snapshots
            .into_iter()
            .map(|(date, list)| {
                let by_etf = list.into_iter().map(|h| (h.etf_code.clone(), h)).collect();
                (date, by_etf)
            })
            .collect();
        Self {
            snapshots,
            calendar,
            mode,
        }
    }

    /// Holdings of one ETF as of `date`. Step mode holds the last known
    /// snapshot; linear mode additionally interpolates weights toward the
    /// next snapshot by trading-day distance. With no snapshot at or before
    /// `date`, the earliest one is used.
    pub fn holdings_at(&self, etf_code: &str, date: NaiveDate) -> Option<EtfHoldings> {
        let prev = self
            .snapshots
            .range(..=date)
            .rev()
            .find_map(|(d, by_etf)| by_etf.get(etf_code).map(|h| (*d, h)));

        let (prev_date, prev_holdings) = match prev {
            Some(found) => found,
            None => {
                // Before the first disclosure: use it as-is.
                let (d, h) = self
                    .snapshots
                    .iter()
                    .find_map(|(d, by_etf)| by_etf.get(etf_code).map(|h| (*d, h)))?;
                (d, h)
            }
        };

        let mut result = prev_holdings.clone();
        result.as_of = date;
        for holding in &mut result.holdings {
            holding.as_of = date;
        }

        if self.mode == Interpolation::Step {
            return Some(result);
        }

        let next = self
            .snapshots
            .range(date..)
            .filter(|(d, _)| **d > prev_date)
            .find_map(|(d, by_etf)| by_etf.get(etf_code).map(|h| (*d, h)));
        let Some((next_date, next_holdings)) = next else {
            return Some(result);
        };

        let span = self.calendar.trading_dates(prev_date, next_date).len();
        if span <= 1 {
            return Some(result);
        }
        let elapsed = self.calendar.trading_dates(prev_date, date).len().saturating_sub(1);
        let fraction = elapsed as f64 / (span - 1) as f64;

        let next_weights: HashMap<&str, f64> = next_holdings
            .holdings
            .iter()
            .map(|h| (h.stock_code.as_str(), h.weight))
            .collect();
        for holding in &mut result.holdings {
            if let Some(next_weight) = next_weights.get(holding.stock_code.as_str()) {
                holding.weight += (next_weight - holding.weight) * fraction;
            }
        }
        Some(result)
    }
}

/// `HoldingsProvider` view of a timeline pinned to one date, so the mapping
/// store can rebuild from it unchanged.
pub struct HoldingsAt {
    pub timeline: Arc<HoldingsTimeline>,
    pub date: NaiveDate,
}

#[async_trait]
impl HoldingsProvider for HoldingsAt {
    async fn top_holdings(&self, etf_code: &str) -> Result<EtfHoldings> {
        self.timeline
            .holdings_at(etf_code, self.date)
            .with_context(|| format!("no holdings snapshot covering {} for {}", self.date, etf_code))
    }
}

/// Test/demo helper: a snapshot built from (stock, weight) pairs.
pub fn snapshot(etf_code: &str, etf_name: &str, as_of: NaiveDate, positions: &[(&str, f64)]) -> EtfHoldings {
    EtfHoldings {
        etf_code: etf_code.to_string(),
        etf_name: etf_name.to_string(),
        as_of,
        holdings: positions
            .iter()
            .enumerate()
            .map(|(i, (stock, weight))| Holding {
                stock_code: (*stock).to_string(),
                stock_name: (*stock).to_string(),
                etf_code: etf_code.to_string(),
                weight: *weight,
                rank: i as u32 + 1,
                as_of,
            })
            .collect(),
    }
}
