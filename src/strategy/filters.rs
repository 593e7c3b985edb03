//! Signal filters. Each one answers a single question about a drafted
//! signal; the engine walks them in configured order.

use serde_json::Value;

use crate::models::{CandidateEtf, MarketEvent, RiskLevel, TradingSignal};
use crate::strategy::{FilterContext, FilterVerdict, SignalFilter};

/// Rejects signals too close to the session close to act on. A signal with
/// under `min_time_to_close` seconds left cannot be traded and unwound with
/// any margin.
pub struct TimeFilter {
    min_time_to_close: i64,
}

impl TimeFilter {
    pub fn from_config(config: &Value) -> Self {
        Self {
            min_time_to_close: config
                .get("min_time_to_close")
                .and_then(Value::as_i64)
                .unwrap_or(1800),
        }
    }
}

impl SignalFilter for TimeFilter {
    fn name(&self) -> &'static str {
        "time_filter"
    }

    fn is_required(&self) -> bool {
        true
    }

    fn check(
        &self,
        ctx: &FilterContext,
        _event: &MarketEvent,
        _fund: &CandidateEtf,
        _draft: &TradingSignal,
    ) -> FilterVerdict {
        match ctx.seconds_to_close() {
            None => FilterVerdict::reject("not in trading session"),
            Some(secs) if secs < self.min_time_to_close => FilterVerdict::reject(format!(
                "time to close {}s < {}s",
                secs, self.min_time_to_close
            )),
            Some(secs) => FilterVerdict::pass(format!("{}s to close", secs)),
        }
    }
}

/// Rejects ETFs whose day turnover is too thin to absorb the trade.
pub struct LiquidityFilter {
    min_daily_amount: f64,
}

impl LiquidityFilter {
    pub fn from_config(config: &Value) -> Self {
        Self {
            min_daily_amount: config
                .get("min_daily_amount")
                .and_then(Value::as_f64)
                .unwrap_or(50_000_000.0),
        }
    }
}

impl SignalFilter for LiquidityFilter {
    fn name(&self) -> &'static str {
        "liquidity_filter"
    }

    fn is_required(&self) -> bool {
        true
    }

    fn check(
        &self,
        _ctx: &FilterContext,
        _event: &MarketEvent,
        fund: &CandidateEtf,
        _draft: &TradingSignal,
    ) -> FilterVerdict {
        if fund.daily_amount < self.min_daily_amount {
            FilterVerdict::reject(format!(
                "daily amount {:.0} < {:.0}",
                fund.daily_amount, self.min_daily_amount
            ))
        } else {
            FilterVerdict::pass(format!("daily amount {:.0}M", fund.daily_amount / 1.0e6))
        }
    }
}

/// Rejects drafts below a confidence-score floor.
pub struct ConfidenceFilter {
    min_confidence: f64,
}

impl ConfidenceFilter {
    pub fn from_config(config: &Value) -> Self {
        Self {
            min_confidence: config
                .get("min_confidence")
                .and_then(Value::as_f64)
                .unwrap_or(0.40),
        }
    }
}

impl SignalFilter for ConfidenceFilter {
    fn name(&self) -> &'static str {
        "confidence_filter"
    }

    fn is_required(&self) -> bool {
        false
    }

    fn check(
        &self,
        _ctx: &FilterContext,
        _event: &MarketEvent,
        _fund: &CandidateEtf,
        draft: &TradingSignal,
    ) -> FilterVerdict {
        if draft.confidence_score < self.min_confidence {
            FilterVerdict::reject(format!(
                "confidence {:.2} < {:.2}",
                draft.confidence_score, self.min_confidence
            ))
        } else {
            FilterVerdict::pass(format!("confidence {:.2}", draft.confidence_score))
        }
    }
}

/// Rejects drafts the evaluator marked high-risk.
pub struct RiskFilter;

impl RiskFilter {
    pub fn from_config(_config: &Value) -> Self {
        Self
    }
}

impl SignalFilter for RiskFilter {
    fn name(&self) -> &'static str {
        "risk_filter"
    }

    fn is_required(&self) -> bool {
        false
    }

    fn check(
        &self,
        _ctx: &FilterContext,
        _event: &MarketEvent,
        _fund: &CandidateEtf,
        draft: &TradingSignal,
    ) -> FilterVerdict {
        if draft.risk_level == RiskLevel::High {
            FilterVerdict::reject("risk level high")
        } else {
            FilterVerdict::pass(format!("risk {}", draft.risk_level.as_str()))
        }
    }
}
