//! Core domain types shared across the engine, backtester and API.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A point-in-time quote for a single security.
///
/// Produced at the provider boundary; the limit flags are derived there from
/// the previous close and the board's daily limit, never stored upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub prev_close: f64,
    /// Fractional change, +0.10 == +10%.
    pub change_pct: f64,
    pub volume: f64,
    /// Cash turnover for the day.
    pub amount: f64,
    pub timestamp: NaiveDateTime,
    pub is_limit_up: bool,
    pub is_limit_down: bool,
    /// Time the security first sealed at the limit, when known.
    #[serde(default)]
    pub limit_time: Option<NaiveDateTime>,
    /// Outstanding buy volume (cash) at the limit price.
    #[serde(default)]
    pub seal_amount: f64,
    /// Times the limit broke open intraday.
    #[serde(default)]
    pub open_count: u32,
    #[serde(default = "default_true")]
    pub is_first_limit: bool,
}

fn default_true() -> bool {
    true
}

/// One position inside an ETF's disclosed top holdings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub stock_code: String,
    pub stock_name: String,
    pub etf_code: String,
    /// Fraction of the ETF's net assets, in [0, 1].
    pub weight: f64,
    /// 1-based position in the top-holdings table.
    pub rank: u32,
    pub as_of: NaiveDate,
}

/// Top-holdings snapshot for a single ETF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtfHoldings {
    pub etf_code: String,
    pub etf_name: String,
    pub as_of: NaiveDate,
    /// Ordered by rank ascending.
    pub holdings: Vec<Holding>,
}

impl EtfHoldings {
    /// Combined weight of the top ten positions. Per disclosure rules this
    /// sum never exceeds 1.
    pub fn top10_ratio(&self) -> f64 {
        self.holdings.iter().take(10).map(|h| h.weight).sum()
    }
}

/// An ETF considered as the trading vehicle for a pinned stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEtf {
    pub etf_code: String,
    pub etf_name: String,
    pub weight: f64,
    pub rank: u32,
    /// Concentration of the ETF's top ten holdings; feeds risk scoring.
    #[serde(default)]
    pub top10_ratio: f64,
    /// Day cash turnover of the ETF itself, for liquidity filtering.
    #[serde(default)]
    pub daily_amount: f64,
    #[serde(default)]
    pub quote: Option<Quote>,
}

/// Detected market event driving a scan decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum MarketEvent {
    LimitUp(LimitUpEvent),
    Breakout(BreakoutEvent),
    Momentum(MomentumEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitUpEvent {
    pub stock_code: String,
    pub stock_name: String,
    pub price: f64,
    pub change_pct: f64,
    pub limit_time: Option<NaiveDateTime>,
    pub seal_amount: f64,
    pub open_count: u32,
    pub is_first_limit: bool,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakoutEvent {
    pub stock_code: String,
    pub stock_name: String,
    pub price: f64,
    pub change_pct: f64,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumEvent {
    pub stock_code: String,
    pub stock_name: String,
    pub price: f64,
    pub change_pct: f64,
    pub timestamp: NaiveDateTime,
}

impl MarketEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            MarketEvent::LimitUp(_) => "limit_up",
            MarketEvent::Breakout(_) => "breakout",
            MarketEvent::Momentum(_) => "momentum",
        }
    }

    pub fn stock_code(&self) -> &str {
        match self {
            MarketEvent::LimitUp(e) => &e.stock_code,
            MarketEvent::Breakout(e) => &e.stock_code,
            MarketEvent::Momentum(e) => &e.stock_code,
        }
    }

    pub fn stock_name(&self) -> &str {
        match self {
            MarketEvent::LimitUp(e) => &e.stock_name,
            MarketEvent::Breakout(e) => &e.stock_name,
            MarketEvent::Momentum(e) => &e.stock_name,
        }
    }

    pub fn price(&self) -> f64 {
        match self {
            MarketEvent::LimitUp(e) => e.price,
            MarketEvent::Breakout(e) => e.price,
            MarketEvent::Momentum(e) => e.price,
        }
    }

    pub fn change_pct(&self) -> f64 {
        match self {
            MarketEvent::LimitUp(e) => e.change_pct,
            MarketEvent::Breakout(e) => e.change_pct,
            MarketEvent::Momentum(e) => e.change_pct,
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        match self {
            MarketEvent::LimitUp(e) => e.timestamp,
            MarketEvent::Breakout(e) => e.timestamp,
            MarketEvent::Momentum(e) => e.timestamp,
        }
    }

    /// Cash sealed at the limit; zero for non-limit events.
    pub fn seal_amount(&self) -> f64 {
        match self {
            MarketEvent::LimitUp(e) => e.seal_amount,
            _ => 0.0,
        }
    }

    pub fn open_count(&self) -> u32 {
        match self {
            MarketEvent::LimitUp(e) => e.open_count,
            _ => 0,
        }
    }

    /// Time the event first fired; falls back to the event timestamp.
    pub fn first_fired_at(&self) -> NaiveDateTime {
        match self {
            MarketEvent::LimitUp(e) => e.limit_time.unwrap_or(e.timestamp),
            other => other.timestamp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(ConfidenceLevel::High),
            "medium" => Some(ConfidenceLevel::Medium),
            "low" => Some(ConfidenceLevel::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(RiskLevel::High),
            "medium" => Some(RiskLevel::Medium),
            "low" => Some(RiskLevel::Low),
            _ => None,
        }
    }
}

/// Named per-factor sub-scores behind a signal's confidence score.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub order: f64,
    pub weight: f64,
    pub liquidity: f64,
    pub time: f64,
}

/// A candidate trade proposal: given an event on a stock, route through an
/// ETF that holds it. Immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSignal {
    /// Repository rowid; None until persisted.
    pub id: Option<i64>,
    pub timestamp: NaiveDateTime,
    pub stock_code: String,
    pub stock_name: String,
    pub stock_price: f64,
    pub etf_code: String,
    pub etf_name: String,
    pub weight: f64,
    pub event_type: String,
    pub confidence_level: ConfidenceLevel,
    pub confidence_score: f64,
    pub risk_level: RiskLevel,
    pub reason: String,
    pub breakdown: ScoreBreakdown,
}

/// One watched security.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchEntry {
    pub code: String,
    pub name: String,
    pub market: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
