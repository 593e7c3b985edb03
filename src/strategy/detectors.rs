//! Event detectors.

use serde_json::Value;

use crate::market::board::{self, Board};
use crate::models::{LimitUpEvent, MarketEvent, Quote};
use crate::strategy::EventDetector;

/// Limit-up detection for A-share equities.
///
/// Fires when the provider-derived `is_limit_up` flag is set. Validation
/// re-checks the change percentage against the board's minimum, so a quote
/// mislabeled upstream cannot produce a signal.
#[derive(Debug)]
pub struct LimitUpDetector {
    /// Optional flat floor on change_pct; when absent the board-specific
    /// minimum applies.
    min_change_pct: Option<f64>,
}

impl LimitUpDetector {
    pub fn from_config(config: &Value) -> Self {
        Self {
            min_change_pct: config.get("min_change_pct").and_then(Value::as_f64),
        }
    }

    fn min_change_for(&self, board: Board) -> f64 {
        self.min_change_pct.unwrap_or_else(|| board.min_limit_change())
    }
}

impl EventDetector for LimitUpDetector {
    fn name(&self) -> &'static str {
        "limit_up"
    }

    fn detect(&self, quote: &Quote) -> Option<MarketEvent> {
        if !quote.is_limit_up {
            return None;
        }
        Some(MarketEvent::LimitUp(LimitUpEvent {
            stock_code: quote.code.clone(),
            stock_name: quote.name.clone(),
            price: quote.price,
            change_pct: quote.change_pct,
            limit_time: quote.limit_time,
            seal_amount: quote.seal_amount,
            open_count: quote.open_count,
            is_first_limit: quote.is_first_limit,
            timestamp: quote.timestamp,
        }))
    }

    fn is_valid(&self, event: &MarketEvent) -> bool {
        match event {
            MarketEvent::LimitUp(e) => {
                let board = board::board_of(&e.stock_code);
                e.change_pct >= self.min_change_for(board)
            }
            _ => false,
        }
    }
}

/// Breakout detection. Registered so configurations can name it; the
/// detection logic is not implemented yet and no events fire.
#[derive(Debug)]
pub struct BreakoutDetector;

impl BreakoutDetector {
    pub fn from_config(_config: &Value) -> Self {
        Self
    }
}

impl EventDetector for BreakoutDetector {
    fn name(&self) -> &'static str {
        "breakout"
    }

    fn detect(&self, _quote: &Quote) -> Option<MarketEvent> {
        None
    }

    fn is_valid(&self, event: &MarketEvent) -> bool {
        matches!(event, MarketEvent::Breakout(_))
    }
}

/// Momentum detection. Same status as [`BreakoutDetector`].
#[derive(Debug)]
pub struct MomentumDetector;

impl MomentumDetector {
    pub fn from_config(_config: &Value) -> Self {
        Self
    }
}

impl EventDetector for MomentumDetector {
    fn name(&self) -> &'static str {
        "momentum"
    }

    fn detect(&self, _quote: &Quote) -> Option<MarketEvent> {
        None
    }

    fn is_valid(&self, event: &MarketEvent) -> bool {
        matches!(event, MarketEvent::Momentum(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn limit_up_quote() -> Quote {
        Quote {
            code: "600519".into(),
            name: "Moutai".into(),
            price: 1980.0,
            prev_close: 1800.16,
            change_pct: 0.0999,
            volume: 1.0e6,
            amount: 1.98e9,
            timestamp: "2026-03-05T14:05:00".parse().unwrap(),
            is_limit_up: true,
            is_limit_down: false,
            limit_time: Some("2026-03-05T13:41:00".parse().unwrap()),
            seal_amount: 1.2e9,
            open_count: 0,
            is_first_limit: true,
        }
    }

    #[test]
    fn detects_limit_up_quote() {
        let detector = LimitUpDetector::from_config(&json!({}));
        let event = detector.detect(&limit_up_quote()).expect("event");
        assert_eq!(event.event_type(), "limit_up");
        assert_eq!(event.stock_code(), "600519");
        assert!((event.seal_amount() - 1.2e9).abs() < 1.0);
        assert!(detector.is_valid(&event));
    }

    #[test]
    fn ignores_non_pinned_quote() {
        let detector = LimitUpDetector::from_config(&json!({}));
        let mut quote = limit_up_quote();
        quote.is_limit_up = false;
        assert!(detector.detect(&quote).is_none());
    }

    #[test]
    fn validation_rejects_implausible_change() {
        let detector = LimitUpDetector::from_config(&json!({ "min_change_pct": 0.095 }));
        let mut quote = limit_up_quote();
        quote.change_pct = 0.06;
        let event = detector.detect(&quote).expect("event");
        assert!(!detector.is_valid(&event));
    }

    #[test]
    fn board_minimum_applies_without_config() {
        let detector = LimitUpDetector::from_config(&json!({}));
        let mut quote = limit_up_quote();
        // STAR board: 20% limit, so a 10% move is invalid there.
        quote.code = "688111".into();
        quote.change_pct = 0.10;
        let event = detector.detect(&quote).expect("event");
        assert!(!detector.is_valid(&event));
    }

    #[test]
    fn placeholder_detectors_fire_nothing() {
        let quote = limit_up_quote();
        assert!(BreakoutDetector.detect(&quote).is_none());
        assert!(MomentumDetector.detect(&quote).is_none());
    }
}
