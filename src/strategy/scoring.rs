//! Signal drafting: confidence scoring and risk classification.
//!
//! A draft is produced after fund selection and before the filter chain, so
//! confidence- and risk-based filters can act on it.

use crate::config::SignalEvaluationConfig;
use crate::models::{
    CandidateEtf, ConfidenceLevel, MarketEvent, RiskLevel, ScoreBreakdown, TradingSignal,
};
use crate::strategy::FilterContext;
use chrono::Timelike;

/// Seal amount treated as a full-strength order factor.
const ORDER_FULL_SCALE: f64 = 1.0e9;
/// ETF day turnover treated as fully liquid.
const LIQUIDITY_FULL_SCALE: f64 = 5.0e8;
/// Holding weight treated as maximal exposure.
const WEIGHT_FULL_SCALE: f64 = 0.10;
/// Two trading hours of runway scores as full time margin.
const TIME_FULL_SCALE: f64 = 2.0 * 3600.0;

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Weighted-sum confidence score in [0, 1] plus its per-factor breakdown.
pub fn confidence_score(
    cfg: &SignalEvaluationConfig,
    event: &MarketEvent,
    fund: &CandidateEtf,
    seconds_to_close: Option<i64>,
) -> (f64, ScoreBreakdown) {
    let breakdown = ScoreBreakdown {
        order: clamp01(event.seal_amount() / ORDER_FULL_SCALE),
        weight: clamp01(fund.weight / WEIGHT_FULL_SCALE),
        liquidity: clamp01(fund.daily_amount / LIQUIDITY_FULL_SCALE),
        time: clamp01(seconds_to_close.unwrap_or(0) as f64 / TIME_FULL_SCALE),
    };
    let score = cfg.weight_order * breakdown.order
        + cfg.weight_weight * breakdown.weight
        + cfg.weight_liquidity * breakdown.liquidity
        + cfg.weight_time * breakdown.time;
    (clamp01(score), breakdown)
}

pub fn confidence_level(cfg: &SignalEvaluationConfig, score: f64) -> ConfidenceLevel {
    if score >= cfg.cutoff_high {
        ConfidenceLevel::High
    } else if score >= cfg.cutoff_medium {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

/// Risk classification.
///
/// High: almost no runway to the close, over-concentrated top-10 book, or a
/// limit that keeps breaking open. Low: ample runway and an early first
/// seal. Everything else is medium.
pub fn risk_level(
    cfg: &SignalEvaluationConfig,
    event: &MarketEvent,
    fund: &CandidateEtf,
    seconds_to_close: Option<i64>,
) -> RiskLevel {
    let secs = seconds_to_close.unwrap_or(0);
    if secs < cfg.risk_high_time_seconds
        || fund.top10_ratio > cfg.risk_top10_ratio_high
        || event.open_count() > 2
    {
        return RiskLevel::High;
    }
    if secs > cfg.risk_low_time_seconds && event.first_fired_at().hour() < cfg.risk_morning_hour {
        return RiskLevel::Low;
    }
    RiskLevel::Medium
}

/// Build the draft signal handed to the filter chain. The reason starts
/// from the selector's explanation; the engine appends filter notes as the
/// chain passes.
pub fn draft_signal(
    ctx: &FilterContext,
    event: &MarketEvent,
    fund: &CandidateEtf,
    selection_reason: &str,
) -> TradingSignal {
    let cfg = &ctx.evaluation;
    let seconds_to_close = ctx.seconds_to_close();
    let (score, breakdown) = confidence_score(cfg, event, fund, seconds_to_close);

    TradingSignal {
        id: None,
        timestamp: ctx.now,
        stock_code: event.stock_code().to_string(),
        stock_name: event.stock_name().to_string(),
        stock_price: event.price(),
        etf_code: fund.etf_code.clone(),
        etf_name: fund.etf_name.clone(),
        weight: fund.weight,
        event_type: event.event_type().to_string(),
        confidence_level: confidence_level(cfg, score),
        confidence_score: score,
        risk_level: risk_level(cfg, event, fund, seconds_to_close),
        reason: format!(
            "{} {} +{:.2}%: {}",
            event.stock_name(),
            event.event_type(),
            event.change_pct() * 100.0,
            selection_reason
        ),
        breakdown,
    }
}

/// Named evaluator presets. `default` implements the canonical thresholds;
/// the other two shift the cutoffs and risk windows the way their names
/// suggest.
pub fn evaluator_preset(name: &str) -> Option<SignalEvaluationConfig> {
    let base = SignalEvaluationConfig::default();
    match name {
        "default" => Some(base),
        "conservative" => Some(SignalEvaluationConfig {
            cutoff_high: 0.80,
            cutoff_medium: 0.50,
            risk_high_time_seconds: 1800,
            risk_low_time_seconds: 7200,
            risk_top10_ratio_high: 0.60,
            ..base
        }),
        "aggressive" => Some(SignalEvaluationConfig {
            cutoff_high: 0.60,
            cutoff_medium: 0.30,
            risk_high_time_seconds: 300,
            risk_low_time_seconds: 1800,
            ..base
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::TradingCalendar;
    use crate::models::LimitUpEvent;

    fn event(seal_amount: f64, open_count: u32, limit_time: &str) -> MarketEvent {
        MarketEvent::LimitUp(LimitUpEvent {
            stock_code: "600519".into(),
            stock_name: "Moutai".into(),
            price: 1980.0,
            change_pct: 0.0999,
            limit_time: Some(limit_time.parse().unwrap()),
            seal_amount,
            open_count,
            is_first_limit: true,
            timestamp: "2026-03-05T14:05:00".parse().unwrap(),
        })
    }

    fn fund(weight: f64, daily_amount: f64, top10_ratio: f64) -> CandidateEtf {
        CandidateEtf {
            etf_code: "510300".into(),
            etf_name: "CSI 300 ETF".into(),
            weight,
            rank: 5,
            top10_ratio,
            daily_amount,
            quote: None,
        }
    }

    fn ctx(now: &str) -> FilterContext {
        FilterContext {
            now: now.parse().unwrap(),
            calendar: TradingCalendar::default(),
            evaluation: SignalEvaluationConfig::default(),
        }
    }

    #[test]
    fn score_weights_and_clamps() {
        let cfg = SignalEvaluationConfig::default();
        let ev = event(2.0e9, 0, "2026-03-05T13:41:00"); // order factor clamps to 1
        let f = fund(0.085, 8.0e8, 0.5); // weight 0.85, liquidity clamps to 1
        let (score, b) = confidence_score(&cfg, &ev, &f, Some(3300));
        assert!((b.order - 1.0).abs() < 1e-9);
        assert!((b.weight - 0.85).abs() < 1e-9);
        assert!((b.liquidity - 1.0).abs() < 1e-9);
        assert!((b.time - 3300.0 / 7200.0).abs() < 1e-9);
        let expected = 0.30 + 0.30 * 0.85 + 0.20 + 0.20 * (3300.0 / 7200.0);
        assert!((score - expected).abs() < 1e-9);
        assert_eq!(confidence_level(&cfg, score), ConfidenceLevel::High);
    }

    #[test]
    fn level_cutoffs() {
        let cfg = SignalEvaluationConfig::default();
        assert_eq!(confidence_level(&cfg, 0.70), ConfidenceLevel::High);
        assert_eq!(confidence_level(&cfg, 0.699), ConfidenceLevel::Medium);
        assert_eq!(confidence_level(&cfg, 0.40), ConfidenceLevel::Medium);
        assert_eq!(confidence_level(&cfg, 0.399), ConfidenceLevel::Low);
    }

    #[test]
    fn risk_rules() {
        let cfg = SignalEvaluationConfig::default();
        let f = fund(0.085, 8.0e8, 0.5);

        // Under ten minutes to close -> high.
        let ev = event(1.0e9, 0, "2026-03-05T13:41:00");
        assert_eq!(risk_level(&cfg, &ev, &f, Some(599)), RiskLevel::High);

        // Concentrated book -> high regardless of time.
        let concentrated = fund(0.085, 8.0e8, 0.75);
        assert_eq!(
            risk_level(&cfg, &ev, &concentrated, Some(5000)),
            RiskLevel::High
        );

        // Limit broke open three times -> high.
        let churny = event(1.0e9, 3, "2026-03-05T13:41:00");
        assert_eq!(risk_level(&cfg, &churny, &f, Some(5000)), RiskLevel::High);

        // Early seal with lots of runway -> low.
        let early = event(1.0e9, 0, "2026-03-05T09:45:00");
        assert_eq!(risk_level(&cfg, &early, &f, Some(5000)), RiskLevel::Low);

        // Afternoon seal, moderate runway -> medium.
        let afternoon = event(1.0e9, 0, "2026-03-05T14:05:00");
        assert_eq!(risk_level(&cfg, &afternoon, &f, Some(3300)), RiskLevel::Medium);
    }

    #[test]
    fn canonical_limit_up_draft_is_high_confidence_medium_risk() {
        let c = ctx("2026-03-05T14:05:00");
        let ev = event(1.2e9, 0, "2026-03-05T13:41:00");
        let f = fund(0.085, 8.0e8, 0.5);
        let draft = draft_signal(&c, &ev, &f, "highest weight 8.50% (rank 5)");
        assert_eq!(draft.confidence_level, ConfidenceLevel::High);
        assert_eq!(draft.risk_level, RiskLevel::Medium);
        assert!(draft.reason.contains("weight 8.50%"));
        assert_eq!(draft.event_type, "limit_up");
    }

    #[test]
    fn presets_resolve() {
        assert!(evaluator_preset("default").is_some());
        let conservative = evaluator_preset("conservative").unwrap();
        assert!(conservative.cutoff_high > 0.70);
        let aggressive = evaluator_preset("aggressive").unwrap();
        assert!(aggressive.cutoff_high < 0.70);
        assert!(evaluator_preset("bogus").is_none());
    }
}
