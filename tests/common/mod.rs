//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use etfarb_backend::api::AppState;
use etfarb_backend::backtest::driver::BacktestDeps;
use etfarb_backend::backtest::jobs::JobStore;
use etfarb_backend::cache::TtlCache;
use etfarb_backend::config::Config;
use etfarb_backend::engine::monitor::Monitor;
use etfarb_backend::engine::ArbitrageEngine;
use etfarb_backend::mapping::{MappedEtf, MappingDocument, MappingStore};
use etfarb_backend::market::provider::{DailyBar, HistoryProvider, StaticMarketSource};
use etfarb_backend::market::TradingCalendar;
use etfarb_backend::models::{EtfHoldings, Quote};
use etfarb_backend::registry::Registries;
use etfarb_backend::signals::repository::SignalRepository;
use etfarb_backend::watchlist::WatchlistStore;

/// Fixed-data history source for deterministic replays.
#[derive(Default)]
pub struct StaticHistory {
    pub bars: HashMap<String, Vec<DailyBar>>,
    pub snapshots: BTreeMap<NaiveDate, Vec<EtfHoldings>>,
}

#[async_trait]
impl HistoryProvider for StaticHistory {
    async fn daily_bars(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>> {
        Ok(self
            .bars
            .get(code)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start && b.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn holdings_snapshots(
        &self,
        _etf_codes: &[String],
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, Vec<EtfHoldings>>> {
        Ok(self.snapshots.clone())
    }
}

pub fn stock_quote(
    code: &str,
    name: &str,
    prev_close: f64,
    price: f64,
    change_pct: f64,
    ts: &str,
) -> Quote {
    Quote {
        code: code.into(),
        name: name.into(),
        price,
        prev_close,
        change_pct,
        volume: 1.0e6,
        amount: price * 1.0e6,
        timestamp: ts.parse().unwrap(),
        is_limit_up: false,
        is_limit_down: false,
        limit_time: Some(format!("{}T13:41:00", &ts[..10]).parse().unwrap()),
        seal_amount: 1.2e9,
        open_count: 0,
        is_first_limit: true,
    }
}

pub fn etf_quote(code: &str, amount: f64, ts: &str) -> Quote {
    Quote {
        code: code.into(),
        name: format!("ETF {code}"),
        price: 4.0,
        prev_close: 3.96,
        change_pct: 0.0101,
        volume: 2.0e8,
        amount,
        timestamp: ts.parse().unwrap(),
        is_limit_up: false,
        is_limit_down: false,
        limit_time: None,
        seal_amount: 0.0,
        open_count: 0,
        is_first_limit: true,
    }
}

pub fn mapping_document(entries: &[(&str, &[(&str, f64, u32)])]) -> MappingDocument {
    let mut document = MappingDocument::new();
    for (stock, etfs) in entries {
        document.insert(
            (*stock).to_string(),
            etfs.iter()
                .map(|(code, weight, rank)| MappedEtf {
                    etf_code: (*code).to_string(),
                    etf_name: format!("ETF {code}"),
                    weight: *weight,
                    rank: *rank,
                    top10_ratio: 0.55,
                })
                .collect(),
        );
    }
    document
}

/// Handles the API tests keep after building a router, for poking state
/// behind the HTTP surface.
pub struct TestHandles {
    pub source: Arc<StaticMarketSource>,
    pub watchlist: Arc<WatchlistStore>,
    pub monitor: Arc<Monitor>,
}

/// A complete application state over in-memory collaborators.
pub fn app_state(
    source: Arc<StaticMarketSource>,
    mapping: Arc<MappingStore>,
    history: Arc<StaticHistory>,
) -> AppState {
    let config = Arc::new(Config::from_env().unwrap());
    let registries = Arc::new(Registries::with_builtins());
    let calendar = TradingCalendar::default();
    let repository = Arc::new(SignalRepository::in_memory().unwrap());
    let watchlist = Arc::new(WatchlistStore::ephemeral());

    let engine = Arc::new(
        ArbitrageEngine::new(
            config.strategy.clone(),
            config.signal_evaluation,
            calendar,
            config.cache,
            &config.engine,
            &registries,
            source.clone(),
            source.clone(),
            mapping.clone(),
            repository.clone(),
            Vec::new(),
        )
        .unwrap(),
    );

    let monitor = Monitor::new(
        engine.clone(),
        watchlist.clone(),
        Duration::from_secs(config.strategy.scan_interval_secs),
        Duration::from_secs(1),
    );

    let backtest_deps = Arc::new(BacktestDeps {
        base_config: (*config).clone(),
        registries: registries.clone(),
        history,
    });

    AppState {
        config,
        registries,
        engine,
        monitor,
        repository,
        mapping,
        watchlist,
        jobs: JobStore::new(),
        backtest_deps,
        quotes: source.clone(),
        holdings: source,
        limit_up_cache: Arc::new(TtlCache::new("limit_up", 16)),
        calendar,
    }
}
