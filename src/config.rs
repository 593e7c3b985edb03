//! Application configuration.
//!
//! Defaults live in code; `.env` / environment variables override them.
//! `EngineConfig` is the strategy-chain selection validated against the
//! plugin registries before the engine may start.

use std::collections::BTreeMap;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub mapping_path: String,
    pub watchlist_path: String,
    /// Base URL of the market-data gateway; empty disables the HTTP source.
    pub quote_api_base: String,
    #[serde(skip_serializing)]
    pub quote_api_key: Option<String>,
    pub strategy: StrategyConfig,
    pub trading_hours: TradingHoursConfig,
    pub signal_evaluation: SignalEvaluationConfig,
    pub cache: CacheConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Minimum holding weight for an ETF to be eligible.
    pub min_weight: f64,
    /// Minimum ETF day turnover for the liquidity filter.
    pub min_etf_volume: f64,
    /// Minimum seal amount treated as a full-strength order factor.
    pub min_order_amount: f64,
    pub scan_interval_secs: u64,
    pub min_time_to_close_secs: i64,
    pub scan_concurrency: usize,
    /// When true, non-required filters only warn instead of rejecting.
    pub bypass_optional_filters: bool,
    pub shutdown_grace_secs: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_weight: 0.05,
            min_etf_volume: 50_000_000.0,
            min_order_amount: 1_000_000_000.0,
            scan_interval_secs: 120,
            min_time_to_close_secs: 1800,
            scan_concurrency: 8,
            bypass_optional_filters: false,
            shutdown_grace_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradingHoursConfig {
    pub morning_open: NaiveTime,
    pub morning_close: NaiveTime,
    pub afternoon_open: NaiveTime,
    pub afternoon_close: NaiveTime,
}

impl Default for TradingHoursConfig {
    fn default() -> Self {
        Self {
            morning_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            morning_close: NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
            afternoon_open: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            afternoon_close: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
        }
    }
}

/// Knobs behind signal scoring. The factor weights must sum to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalEvaluationConfig {
    pub confidence_high_weight: f64,
    pub confidence_low_weight: f64,
    pub confidence_high_rank: u32,
    pub confidence_low_rank: u32,
    pub risk_high_time_seconds: i64,
    pub risk_low_time_seconds: i64,
    pub risk_top10_ratio_high: f64,
    pub risk_morning_hour: u32,
    pub cutoff_high: f64,
    pub cutoff_medium: f64,
    pub weight_order: f64,
    pub weight_weight: f64,
    pub weight_liquidity: f64,
    pub weight_time: f64,
}

impl Default for SignalEvaluationConfig {
    fn default() -> Self {
        Self {
            confidence_high_weight: 0.10,
            confidence_low_weight: 0.05,
            confidence_high_rank: 3,
            confidence_low_rank: 10,
            risk_high_time_seconds: 600,
            risk_low_time_seconds: 3600,
            risk_top10_ratio_high: 0.70,
            risk_morning_hour: 10,
            cutoff_high: 0.70,
            cutoff_medium: 0.40,
            weight_order: 0.30,
            weight_weight: 0.30,
            weight_liquidity: 0.20,
            weight_time: 0.20,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheConfig {
    pub quote_ttl_seconds: u64,
    pub limit_up_ttl_seconds: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            quote_ttl_seconds: 5,
            limit_up_ttl_seconds: 30,
            max_entries: 10_000,
        }
    }
}

/// Strategy chain selection: which plugins run, and with what parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub event_detector: String,
    pub fund_selector: String,
    pub signal_filters: Vec<String>,
    #[serde(default = "empty_object")]
    pub event_config: Value,
    #[serde(default = "empty_object")]
    pub fund_config: Value,
    #[serde(default)]
    pub filter_configs: BTreeMap<String, Value>,
}

fn empty_object() -> Value {
    json!({})
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut filter_configs = BTreeMap::new();
        filter_configs.insert("time_filter".to_string(), json!({ "min_time_to_close": 1800 }));
        filter_configs.insert(
            "liquidity_filter".to_string(),
            json!({ "min_daily_amount": 50_000_000.0 }),
        );
        Self {
            event_detector: "limit_up".to_string(),
            fund_selector: "highest_weight".to_string(),
            signal_filters: vec!["time_filter".to_string(), "liquidity_filter".to_string()],
            event_config: json!({ "min_change_pct": 0.095 }),
            fund_config: json!({ "min_weight": 0.05 }),
            filter_configs,
        }
    }
}

impl EngineConfig {
    /// Config subtree handed to a filter factory; missing entries get `{}`.
    pub fn filter_config(&self, name: &str) -> Value {
        self.filter_configs.get(name).cloned().unwrap_or_else(empty_object)
    }

    /// Effective minimum holding weight for eligibility.
    pub fn min_weight(&self) -> f64 {
        self.fund_config
            .get("min_weight")
            .and_then(Value::as_f64)
            .unwrap_or(0.05)
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let port = env_or("PORT", "8080").parse().unwrap_or(8080);
        let database_path = env_or("DATABASE_PATH", "./data/signals.db");
        let mapping_path = env_or("MAPPING_PATH", "./data/stock_etf_mapping.json");
        let watchlist_path = env_or("WATCHLIST_PATH", "./data/watchlist.json");
        let quote_api_base = env_or("QUOTE_API_BASE", "");
        let quote_api_key = std::env::var("QUOTE_API_KEY").ok();

        let mut strategy = StrategyConfig::default();
        if let Ok(v) = std::env::var("SCAN_INTERVAL_SECS") {
            strategy.scan_interval_secs = v.parse().unwrap_or(strategy.scan_interval_secs);
        }
        if let Ok(v) = std::env::var("SCAN_CONCURRENCY") {
            strategy.scan_concurrency = v.parse().unwrap_or(strategy.scan_concurrency);
        }
        if let Ok(v) = std::env::var("MIN_WEIGHT") {
            strategy.min_weight = v.parse().unwrap_or(strategy.min_weight);
        }

        Ok(Self {
            port,
            database_path,
            mapping_path,
            watchlist_path,
            quote_api_base,
            quote_api_key,
            strategy,
            trading_hours: TradingHoursConfig::default(),
            signal_evaluation: SignalEvaluationConfig::default(),
            cache: CacheConfig::default(),
            engine: EngineConfig::default(),
        })
    }

    /// View safe to hand to API clients; secrets are redacted, not omitted,
    /// so operators can tell whether one is set.
    pub fn sanitized(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "quote_api_key".to_string(),
                json!(self.quote_api_key.as_ref().map(|_| "***")),
            );
        }
        value
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
