//! Plugin registries: named registration and lookup of strategy
//! implementations, plus chain validation against an `EngineConfig`.
//!
//! Registration happens once at startup, before the HTTP server binds;
//! lookups are read-only afterwards. Tests build fresh registries and never
//! touch the process-wide set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::{EngineConfig, SignalEvaluationConfig};
use crate::market::provider::{HttpMarketSource, QuoteProvider, StaticMarketSource};
use crate::signals::sender::{LogSender, SignalSender};
use crate::strategy::{
    detectors::{BreakoutDetector, LimitUpDetector, MomentumDetector},
    filters::{ConfidenceFilter, LiquidityFilter, RiskFilter, TimeFilter},
    scoring,
    selectors::{BestLiquiditySelector, HighestWeightSelector},
    EventDetector, FundSelector, SignalFilter,
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("plugin '{name}' is already registered in {registry}")]
    DuplicateName { registry: &'static str, name: String },
    #[error("unknown plugin '{name}' in {registry} (known: {known})")]
    NotFound {
        registry: &'static str,
        name: String,
        known: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginMeta {
    pub priority: i32,
    pub description: String,
    pub version: String,
}

impl PluginMeta {
    pub fn new(priority: i32, description: &str, version: &str) -> Self {
        Self {
            priority,
            description: description.to_string(),
            version: version.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub name: String,
    #[serde(flatten)]
    pub meta: PluginMeta,
}

type Factory<T> = Box<dyn Fn(&Value) -> Result<T> + Send + Sync>;

struct Slot<T> {
    factory: Factory<T>,
    meta: PluginMeta,
}

/// One registry per strategy kind. Lookups are O(1); re-registration of a
/// name is an error, never a silent overwrite.
pub struct PluginRegistry<T> {
    name: &'static str,
    slots: HashMap<String, Slot<T>>,
}

impl<T> PluginRegistry<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: &str, meta: PluginMeta, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(&Value) -> Result<T> + Send + Sync + 'static,
    {
        if self.slots.contains_key(name) {
            return Err(RegistryError::DuplicateName {
                registry: self.name,
                name: name.to_string(),
            });
        }
        self.slots.insert(
            name.to_string(),
            Slot {
                factory: Box::new(factory),
                meta,
            },
        );
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }

    /// Construct an instance, handing the factory its config subtree.
    pub fn create(&self, name: &str, config: &Value) -> Result<T> {
        let slot = self.slots.get(name).ok_or_else(|| self.not_found(name))?;
        (slot.factory)(config)
    }

    fn not_found(&self, name: &str) -> RegistryError {
        let mut known: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        known.sort_unstable();
        RegistryError::NotFound {
            registry: self.name,
            name: name.to_string(),
            known: known.join(", "),
        }
    }

    /// Inventory ordered by descending priority, then name.
    pub fn list(&self) -> Vec<PluginInfo> {
        let mut infos: Vec<PluginInfo> = self
            .slots
            .iter()
            .map(|(name, slot)| PluginInfo {
                name: name.clone(),
                meta: slot.meta.clone(),
            })
            .collect();
        infos.sort_by(|a, b| {
            b.meta
                .priority
                .cmp(&a.meta.priority)
                .then_with(|| a.name.cmp(&b.name))
        });
        infos
    }
}

/// The resolved strategy chain an engine runs with.
pub struct StrategyChain {
    pub detector: Box<dyn EventDetector>,
    pub selector: Box<dyn FundSelector>,
    pub filters: Vec<Box<dyn SignalFilter>>,
}

/// All process registries, bundled. One instance per process in production,
/// fresh instances in tests.
pub struct Registries {
    pub event_detectors: PluginRegistry<Box<dyn EventDetector>>,
    pub fund_selectors: PluginRegistry<Box<dyn FundSelector>>,
    pub signal_filters: PluginRegistry<Box<dyn SignalFilter>>,
    pub evaluators: PluginRegistry<SignalEvaluationConfig>,
    pub senders: PluginRegistry<Box<dyn SignalSender>>,
    pub sources: PluginRegistry<Arc<dyn QuoteProvider>>,
}

impl Registries {
    pub fn empty() -> Self {
        Self {
            event_detectors: PluginRegistry::new("event_detectors"),
            fund_selectors: PluginRegistry::new("fund_selectors"),
            signal_filters: PluginRegistry::new("signal_filters"),
            evaluators: PluginRegistry::new("evaluators"),
            senders: PluginRegistry::new("senders"),
            sources: PluginRegistry::new("sources"),
        }
    }

    /// Registry set with every built-in registered.
    pub fn with_builtins() -> Self {
        let mut r = Self::empty();

        r.event_detectors
            .register("limit_up", PluginMeta::new(100, "A-share limit-up detection", "1.0.0"), |cfg| {
                Ok(Box::new(LimitUpDetector::from_config(cfg)) as Box<dyn EventDetector>)
            })
            .expect("builtin registration");
        r.event_detectors
            .register("breakout", PluginMeta::new(50, "breakout detection (logic pending)", "0.1.0"), |cfg| {
                Ok(Box::new(BreakoutDetector::from_config(cfg)) as Box<dyn EventDetector>)
            })
            .expect("builtin registration");
        r.event_detectors
            .register("momentum", PluginMeta::new(40, "momentum detection (logic pending)", "0.1.0"), |cfg| {
                Ok(Box::new(MomentumDetector::from_config(cfg)) as Box<dyn EventDetector>)
            })
            .expect("builtin registration");

        r.fund_selectors
            .register("highest_weight", PluginMeta::new(100, "pick the ETF with the highest weight", "1.0.0"), |cfg| {
                Ok(Box::new(HighestWeightSelector::from_config(cfg)) as Box<dyn FundSelector>)
            })
            .expect("builtin registration");
        r.fund_selectors
            .register("best_liquidity", PluginMeta::new(75, "pick the most liquid eligible ETF", "1.0.0"), |cfg| {
                Ok(Box::new(BestLiquiditySelector::from_config(cfg)) as Box<dyn FundSelector>)
            })
            .expect("builtin registration");

        r.signal_filters
            .register("time_filter", PluginMeta::new(100, "minimum runway to session close", "1.0.0"), |cfg| {
                Ok(Box::new(TimeFilter::from_config(cfg)) as Box<dyn SignalFilter>)
            })
            .expect("builtin registration");
        r.signal_filters
            .register("liquidity_filter", PluginMeta::new(90, "minimum ETF day turnover", "1.0.0"), |cfg| {
                Ok(Box::new(LiquidityFilter::from_config(cfg)) as Box<dyn SignalFilter>)
            })
            .expect("builtin registration");
        r.signal_filters
            .register("confidence_filter", PluginMeta::new(40, "minimum confidence score", "1.0.0"), |cfg| {
                Ok(Box::new(ConfidenceFilter::from_config(cfg)) as Box<dyn SignalFilter>)
            })
            .expect("builtin registration");
        r.signal_filters
            .register("risk_filter", PluginMeta::new(50, "reject high-risk drafts", "1.0.0"), |cfg| {
                Ok(Box::new(RiskFilter::from_config(cfg)) as Box<dyn SignalFilter>)
            })
            .expect("builtin registration");

        for (name, priority, description) in [
            ("default", 100, "canonical scoring thresholds"),
            ("conservative", 80, "stricter cutoffs, wider risk windows"),
            ("aggressive", 60, "looser cutoffs, tighter risk windows"),
        ] {
            r.evaluators
                .register(name, PluginMeta::new(priority, description, "1.0.0"), move |_| {
                    scoring::evaluator_preset(name)
                        .ok_or_else(|| anyhow::anyhow!("unknown evaluator preset {name}"))
                })
                .expect("builtin registration");
        }

        r.senders
            .register("log", PluginMeta::new(100, "structured-log notification sink", "1.0.0"), |_| {
                Ok(Box::new(LogSender) as Box<dyn SignalSender>)
            })
            .expect("builtin registration");

        r.sources
            .register("http", PluginMeta::new(100, "JSON market-data gateway", "1.0.0"), |cfg| {
                let base = cfg
                    .get("base_url")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let api_key = cfg
                    .get("api_key")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Ok(Arc::new(HttpMarketSource::new(base, api_key)?) as Arc<dyn QuoteProvider>)
            })
            .expect("builtin registration");
        r.sources
            .register("static", PluginMeta::new(10, "in-memory source for tests and replays", "1.0.0"), |_| {
                Ok(StaticMarketSource::new() as Arc<dyn QuoteProvider>)
            })
            .expect("builtin registration");

        r
    }

    /// Every unresolved plugin name and malformed parameter in the config.
    /// An empty vector means the chain can be built.
    pub fn validate(&self, config: &EngineConfig) -> Vec<String> {
        let mut errors = Vec::new();

        if !self.event_detectors.is_registered(&config.event_detector) {
            errors.push(format!("unknown event_detector '{}'", config.event_detector));
        }
        if !self.fund_selectors.is_registered(&config.fund_selector) {
            errors.push(format!("unknown fund_selector '{}'", config.fund_selector));
        }
        if config.signal_filters.is_empty() {
            errors.push("signal_filters must not be empty".to_string());
        }

        let mut seen = HashSet::new();
        for name in &config.signal_filters {
            if !self.signal_filters.is_registered(name) {
                errors.push(format!("unknown signal_filter '{}'", name));
            }
            if !seen.insert(name.as_str()) {
                errors.push(format!("signal_filter '{}' listed twice", name));
            }
        }

        if let Some(min_change) = config.event_config.get("min_change_pct").and_then(Value::as_f64) {
            if !(0.0..=1.0).contains(&min_change) {
                errors.push(format!("event_config.min_change_pct {} out of [0, 1]", min_change));
            }
        }
        let min_weight = config.min_weight();
        if !(min_weight > 0.0 && min_weight <= 1.0) {
            errors.push(format!("fund_config.min_weight {} out of (0, 1]", min_weight));
        }
        for (name, cfg) in &config.filter_configs {
            if let Some(v) = cfg.get("min_time_to_close").and_then(Value::as_i64) {
                if v < 0 {
                    errors.push(format!("{}.min_time_to_close must be >= 0, got {}", name, v));
                }
            }
            if let Some(v) = cfg.get("min_daily_amount").and_then(Value::as_f64) {
                if v < 0.0 {
                    errors.push(format!("{}.min_daily_amount must be >= 0, got {}", name, v));
                }
            }
            if let Some(v) = cfg.get("min_confidence").and_then(Value::as_f64) {
                if !(0.0..=1.0).contains(&v) {
                    errors.push(format!("{}.min_confidence {} out of [0, 1]", name, v));
                }
            }
        }

        errors
    }

    /// Resolve the configured chain. Refuses when validation reports
    /// anything; if validation is clean every name resolves.
    pub fn build_chain(&self, config: &EngineConfig) -> Result<StrategyChain> {
        let errors = self.validate(config);
        if !errors.is_empty() {
            anyhow::bail!("invalid engine configuration: {}", errors.join("; "));
        }

        let detector = self
            .event_detectors
            .create(&config.event_detector, &config.event_config)?;
        let selector = self
            .fund_selectors
            .create(&config.fund_selector, &config.fund_config)?;
        let mut filters = Vec::with_capacity(config.signal_filters.len());
        for name in &config.signal_filters {
            filters.push(self.signal_filters.create(name, &config.filter_config(name))?);
        }

        Ok(StrategyChain {
            detector,
            selector,
            filters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_registration_is_an_error() {
        let mut registry: PluginRegistry<u32> = PluginRegistry::new("test");
        registry
            .register("a", PluginMeta::new(1, "", "1.0.0"), |_| Ok(1))
            .unwrap();
        let err = registry
            .register("a", PluginMeta::new(2, "", "1.0.0"), |_| Ok(2))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { .. }));
        // The original registration survives.
        assert_eq!(registry.create("a", &json!({})).unwrap(), 1);
    }

    #[test]
    fn lookup_miss_names_known_plugins() {
        let registries = Registries::with_builtins();
        let err = registries
            .event_detectors
            .create("nope", &json!({}))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unknown plugin 'nope'"));
        assert!(message.contains("limit_up"));
    }

    #[test]
    fn list_orders_by_priority_then_name() {
        let mut registry: PluginRegistry<u32> = PluginRegistry::new("test");
        registry.register("zeta", PluginMeta::new(10, "", "1"), |_| Ok(0)).unwrap();
        registry.register("beta", PluginMeta::new(20, "", "1"), |_| Ok(0)).unwrap();
        registry.register("alpha", PluginMeta::new(10, "", "1"), |_| Ok(0)).unwrap();
        let infos = registry.list();
        let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["beta", "alpha", "zeta"]);
    }

    #[test]
    fn validate_reports_every_problem() {
        let registries = Registries::with_builtins();
        let mut config = EngineConfig::default();
        config.event_detector = "bogus_detector".into();
        config.signal_filters = vec![
            "time_filter".into(),
            "bogus_filter".into(),
            "time_filter".into(),
        ];
        config.filter_configs.insert(
            "time_filter".into(),
            json!({ "min_time_to_close": -5 }),
        );

        let errors = registries.validate(&config);
        assert!(errors.iter().any(|e| e.contains("bogus_detector")));
        assert!(errors.iter().any(|e| e.contains("bogus_filter")));
        assert!(errors.iter().any(|e| e.contains("listed twice")));
        assert!(errors.iter().any(|e| e.contains("min_time_to_close")));
    }

    #[test]
    fn empty_filter_chain_is_invalid() {
        let registries = Registries::with_builtins();
        let mut config = EngineConfig::default();
        config.signal_filters.clear();
        let errors = registries.validate(&config);
        assert!(errors.iter().any(|e| e.contains("must not be empty")));
        assert!(registries.build_chain(&config).is_err());
    }

    #[test]
    fn valid_config_builds_every_plugin() {
        let registries = Registries::with_builtins();
        let config = EngineConfig::default();
        assert!(registries.validate(&config).is_empty());
        let chain = registries.build_chain(&config).unwrap();
        assert_eq!(chain.detector.name(), "limit_up");
        assert_eq!(chain.selector.name(), "highest_weight");
        assert_eq!(chain.filters.len(), 2);
    }

    #[test]
    fn builtin_inventories_are_populated() {
        let registries = Registries::with_builtins();
        assert_eq!(registries.event_detectors.count(), 3);
        assert_eq!(registries.fund_selectors.count(), 2);
        assert_eq!(registries.signal_filters.count(), 4);
        assert_eq!(registries.evaluators.count(), 3);
        assert!(registries.senders.is_registered("log"));
        assert!(registries.sources.is_registered("http"));
    }
}
