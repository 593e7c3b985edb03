//! The pluggable strategy pipeline: event detection, fund selection and
//! signal filtering, plus the scoring that drafts a signal between the
//! selector and the filter chain.
//!
//! Implementations are looked up by name through the plugin registries;
//! the names are the public contract.

pub mod detectors;
pub mod filters;
pub mod scoring;
pub mod selectors;

use chrono::NaiveDateTime;

use crate::config::SignalEvaluationConfig;
use crate::market::TradingCalendar;
use crate::models::{CandidateEtf, MarketEvent, Quote, TradingSignal};

/// Per-scan ambient state handed to filters and scoring. In live scans the
/// clock is wall time; backtests pin it to the bar under replay.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext {
    pub now: NaiveDateTime,
    pub calendar: TradingCalendar,
    pub evaluation: SignalEvaluationConfig,
}

impl FilterContext {
    pub fn seconds_to_close(&self) -> Option<i64> {
        self.calendar.seconds_to_close(self.now)
    }
}

/// Outcome of one filter. A failing verdict's reason becomes the signal's
/// rejection reason; a passing note is appended for traceability.
#[derive(Debug, Clone)]
pub struct FilterVerdict {
    pub pass: bool,
    pub note: String,
}

impl FilterVerdict {
    pub fn pass(note: impl Into<String>) -> Self {
        Self {
            pass: true,
            note: note.into(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            pass: false,
            note: reason.into(),
        }
    }
}

/// Stage 1: turn a quote into a market event, or nothing.
pub trait EventDetector: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn detect(&self, quote: &Quote) -> Option<MarketEvent>;

    /// Reject events whose shape is implausible for this detector.
    fn is_valid(&self, event: &MarketEvent) -> bool;
}

/// Stage 2: pick the ETF vehicle from the eligible candidates.
///
/// Candidates arrive already filtered by `min_weight`; an empty slice must
/// yield `None`, never an error.
pub trait FundSelector: Send + Sync {
    fn name(&self) -> &'static str;

    fn select(&self, eligible: &[CandidateEtf], event: &MarketEvent) -> Option<CandidateEtf>;

    fn selection_reason(&self, fund: &CandidateEtf) -> String;
}

/// Stage 3: accept or reject a drafted signal. Filters run in configured
/// order; the first rejection short-circuits the chain.
pub trait SignalFilter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Required filters can never be bypassed by configuration.
    fn is_required(&self) -> bool;

    fn check(
        &self,
        ctx: &FilterContext,
        event: &MarketEvent,
        fund: &CandidateEtf,
        draft: &TradingSignal,
    ) -> FilterVerdict;
}
