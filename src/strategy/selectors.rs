//! Fund selectors.

use std::cmp::Ordering;

use serde_json::Value;

use crate::models::{CandidateEtf, MarketEvent};
use crate::strategy::FundSelector;

/// Picks the ETF where the event stock carries the largest weight; the event
/// moves that fund's NAV the most. Ties break to the lower holding rank,
/// then the lexicographically smaller code.
pub struct HighestWeightSelector;

impl HighestWeightSelector {
    pub fn from_config(_config: &Value) -> Self {
        Self
    }
}

fn by_weight(a: &CandidateEtf, b: &CandidateEtf) -> Ordering {
    a.weight
        .partial_cmp(&b.weight)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.rank.cmp(&a.rank))
        .then_with(|| b.etf_code.cmp(&a.etf_code))
}

impl FundSelector for HighestWeightSelector {
    fn name(&self) -> &'static str {
        "highest_weight"
    }

    fn select(&self, eligible: &[CandidateEtf], _event: &MarketEvent) -> Option<CandidateEtf> {
        eligible.iter().max_by(|a, b| by_weight(a, b)).cloned()
    }

    fn selection_reason(&self, fund: &CandidateEtf) -> String {
        format!(
            "highest weight {:.2}% (rank {})",
            fund.weight * 100.0,
            fund.rank
        )
    }
}

/// Picks the eligible ETF with the largest day turnover: easiest to trade
/// in and out of with minimal slippage.
pub struct BestLiquiditySelector;

impl BestLiquiditySelector {
    pub fn from_config(_config: &Value) -> Self {
        Self
    }
}

impl FundSelector for BestLiquiditySelector {
    fn name(&self) -> &'static str {
        "best_liquidity"
    }

    fn select(&self, eligible: &[CandidateEtf], _event: &MarketEvent) -> Option<CandidateEtf> {
        eligible
            .iter()
            .max_by(|a, b| {
                a.daily_amount
                    .partial_cmp(&b.daily_amount)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| by_weight(a, b))
            })
            .cloned()
    }

    fn selection_reason(&self, fund: &CandidateEtf) -> String {
        format!(
            "best liquidity ({:.0}M daily turnover), weight {:.2}%",
            fund.daily_amount / 1.0e6,
            fund.weight * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LimitUpEvent, MarketEvent};
    use serde_json::json;

    fn event() -> MarketEvent {
        MarketEvent::LimitUp(LimitUpEvent {
            stock_code: "600519".into(),
            stock_name: "Moutai".into(),
            price: 1980.0,
            change_pct: 0.0999,
            limit_time: None,
            seal_amount: 1.0e9,
            open_count: 0,
            is_first_limit: true,
            timestamp: "2026-03-05T14:05:00".parse().unwrap(),
        })
    }

    fn etf(code: &str, weight: f64, rank: u32, daily_amount: f64) -> CandidateEtf {
        CandidateEtf {
            etf_code: code.into(),
            etf_name: format!("ETF {code}"),
            weight,
            rank,
            top10_ratio: 0.5,
            daily_amount,
            quote: None,
        }
    }

    #[test]
    fn highest_weight_wins() {
        let selector = HighestWeightSelector::from_config(&json!({}));
        let picked = selector
            .select(
                &[etf("510300", 0.085, 5, 8.0e8), etf("512000", 0.06, 2, 9.0e8)],
                &event(),
            )
            .unwrap();
        assert_eq!(picked.etf_code, "510300");
    }

    #[test]
    fn weight_tie_breaks_to_lower_rank() {
        let selector = HighestWeightSelector;
        let picked = selector
            .select(
                &[etf("510050", 0.08, 4, 1.0e8), etf("510300", 0.08, 2, 1.0e8)],
                &event(),
            )
            .unwrap();
        assert_eq!(picked.etf_code, "510300");
    }

    #[test]
    fn full_tie_breaks_to_smaller_code() {
        let selector = HighestWeightSelector;
        let picked = selector
            .select(
                &[etf("512880", 0.08, 3, 1.0e8), etf("510300", 0.08, 3, 1.0e8)],
                &event(),
            )
            .unwrap();
        assert_eq!(picked.etf_code, "510300");
    }

    #[test]
    fn empty_eligible_returns_none() {
        assert!(HighestWeightSelector.select(&[], &event()).is_none());
        assert!(BestLiquiditySelector.select(&[], &event()).is_none());
    }

    #[test]
    fn best_liquidity_prefers_turnover() {
        let selector = BestLiquiditySelector::from_config(&json!({}));
        let picked = selector
            .select(
                &[etf("510300", 0.09, 1, 2.0e8), etf("512000", 0.05, 8, 9.0e8)],
                &event(),
            )
            .unwrap();
        assert_eq!(picked.etf_code, "512000");
    }

    #[test]
    fn selection_reason_mentions_weight() {
        let selector = HighestWeightSelector;
        let reason = selector.selection_reason(&etf("510300", 0.085, 5, 8.0e8));
        assert!(reason.contains("weight 8.50%"));
        assert!(reason.contains("rank 5"));
    }
}
