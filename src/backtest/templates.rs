//! Predefined strategy templates, resolved to engine configurations.

use serde::Serialize;
use serde_json::json;

use crate::config::{EngineConfig, SignalEvaluationConfig};
use crate::strategy::scoring;

#[derive(Debug, Clone, Serialize)]
pub struct StrategyTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub min_weight: f64,
    pub min_etf_volume: f64,
    pub min_order_amount: f64,
    pub evaluator: &'static str,
}

pub const TEMPLATES: [StrategyTemplate; 3] = [
    StrategyTemplate {
        id: "conservative",
        name: "Conservative",
        description: "stricter screening; fewer, higher-quality signals",
        min_weight: 0.08,
        min_etf_volume: 80_000_000.0,
        min_order_amount: 1_500_000_000.0,
        evaluator: "conservative",
    },
    StrategyTemplate {
        id: "balanced",
        name: "Balanced",
        description: "recommended defaults balancing count and quality",
        min_weight: 0.05,
        min_etf_volume: 50_000_000.0,
        min_order_amount: 1_000_000_000.0,
        evaluator: "default",
    },
    StrategyTemplate {
        id: "aggressive",
        name: "Aggressive",
        description: "looser screening; more signals, lower floor",
        min_weight: 0.03,
        min_etf_volume: 30_000_000.0,
        min_order_amount: 500_000_000.0,
        evaluator: "aggressive",
    },
];

pub fn get(id: &str) -> Option<&'static StrategyTemplate> {
    TEMPLATES.iter().find(|t| t.id == id)
}

impl StrategyTemplate {
    /// The engine configuration this template stands for.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.fund_config = json!({ "min_weight": self.min_weight });
        config.filter_configs.insert(
            "liquidity_filter".to_string(),
            json!({ "min_daily_amount": self.min_etf_volume }),
        );
        config
    }

    pub fn evaluation(&self) -> SignalEvaluationConfig {
        scoring::evaluator_preset(self.evaluator).unwrap_or_default()
    }
}
