//! The backtest driver: replays the scan pipeline date by date, bar by
//! bar, with the clock pinned to each bar.
//!
//! Determinism contract: no wall clock and no randomness enter the
//! pipeline; per-security work runs sequentially so repository ids are
//! assigned in a stable order. Two runs over the same snapshots produce
//! identical signal sets.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::backtest::clock::{Granularity, SimClock};
use crate::backtest::history::{HistoricalQuoteSource, HoldingsAt, HoldingsTimeline, Interpolation};
use crate::backtest::templates;
use crate::config::{Config, EngineConfig};
use crate::engine::ArbitrageEngine;
use crate::mapping::MappingStore;
use crate::market::provider::HistoryProvider;
use crate::market::TradingCalendar;
use crate::models::{ConfidenceLevel, TradingSignal};
use crate::registry::Registries;
use crate::signals::repository::SignalRepository;
use crate::watchlist::is_valid_code;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default)]
    pub interpolation: Interpolation,
    /// Securities to replay; the current watchlist when absent.
    #[serde(default)]
    pub securities: Option<Vec<String>>,
    /// Template id; overrides `engine_config` when present.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub engine_config: Option<EngineConfig>,
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.start_date > self.end_date {
            bail!(
                "start_date {} is after end_date {}",
                self.start_date,
                self.end_date
            );
        }
        if let Some(template) = &self.template {
            if templates::get(template).is_none() {
                bail!("unknown strategy template '{}'", template);
            }
        }
        if let Some(securities) = &self.securities {
            for code in securities {
                if !is_valid_code(code) {
                    bail!("invalid security code '{}'", code);
                }
            }
        }
        Ok(())
    }

    fn resolve_engine_config(&self) -> EngineConfig {
        if let Some(template) = self.template.as_deref().and_then(templates::get) {
            return template.engine_config();
        }
        self.engine_config.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BacktestStatistics {
    pub total_signals: usize,
    pub high_confidence_count: usize,
    pub medium_confidence_count: usize,
    pub low_confidence_count: usize,
    pub per_date_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub statistics: BacktestStatistics,
    pub signals: Vec<TradingSignal>,
    pub config_echo: BacktestConfig,
}

/// A run either finishes or is cancelled between date boundaries; partial
/// results of a cancelled run are discarded.
pub enum BacktestRun {
    Completed(BacktestResult),
    Cancelled,
}

/// Shared collaborators a backtest borrows from the application.
pub struct BacktestDeps {
    pub base_config: Config,
    pub registries: Arc<Registries>,
    pub history: Arc<dyn HistoryProvider>,
}

pub async fn run_backtest(
    config: &BacktestConfig,
    deps: &BacktestDeps,
    watchlist_codes: Vec<String>,
    etf_universe: Vec<String>,
    mut progress: impl FnMut(f64) + Send,
    cancel: &watch::Receiver<bool>,
) -> Result<BacktestRun> {
    config.validate()?;

    let securities = config
        .securities
        .clone()
        .unwrap_or(watchlist_codes);
    if securities.is_empty() {
        bail!("no securities to replay: watchlist is empty and none were given");
    }
    if etf_universe.is_empty() {
        bail!("no ETF universe to replay against");
    }

    let calendar = TradingCalendar::new(deps.base_config.trading_hours);
    let clock = SimClock::new(&calendar, config.start_date, config.end_date, config.granularity)?;

    // Preload every bar series once, up front.
    let mut quote_source = HistoricalQuoteSource::new(clock.bars()[0]);
    for code in securities.iter().chain(etf_universe.iter()) {
        let bars = deps
            .history
            .daily_bars(code, config.start_date, config.end_date)
            .await
            .with_context(|| format!("failed to load history for {}", code))?;
        quote_source.load_bars(code, bars);
    }
    let quote_source = Arc::new(quote_source);

    let snapshots = deps
        .history
        .holdings_snapshots(&etf_universe, config.start_date, config.end_date)
        .await
        .context("failed to load holdings snapshots")?;
    let timeline = Arc::new(HoldingsTimeline::new(
        snapshots,
        calendar,
        config.interpolation,
    ));

    let engine_config = config.resolve_engine_config();
    let evaluation = config
        .template
        .as_deref()
        .and_then(templates::get)
        .map(|t| t.evaluation())
        .unwrap_or(deps.base_config.signal_evaluation);

    // Sequential execution keeps repository id assignment reproducible.
    let mut strategy = deps.base_config.strategy.clone();
    strategy.scan_concurrency = 1;

    let mapping = Arc::new(MappingStore::new());
    let repository = Arc::new(SignalRepository::in_memory()?);
    let engine = ArbitrageEngine::new(
        strategy,
        evaluation,
        calendar,
        deps.base_config.cache,
        &engine_config,
        &deps.registries,
        quote_source.clone(),
        quote_source.clone(),
        mapping.clone(),
        repository,
        Vec::new(),
    )?;

    let dates_total = clock.dates().len();
    let mut all_signals: Vec<TradingSignal> = Vec::new();
    info!(
        start = %config.start_date,
        end = %config.end_date,
        dates = dates_total,
        securities = securities.len(),
        etfs = etf_universe.len(),
        "backtest started"
    );

    for (dates_done, &date) in clock.dates().iter().enumerate() {
        // Cancellation is honored between date boundaries.
        if *cancel.borrow() {
            info!(date = %date, "backtest cancelled");
            return Ok(BacktestRun::Cancelled);
        }

        mapping
            .rebuild(
                &etf_universe,
                &HoldingsAt {
                    timeline: timeline.clone(),
                    date,
                },
                0.0,
            )
            .await
            .with_context(|| format!("holdings reconstruction failed for {}", date))?;

        for bar in clock.bars_on(date) {
            quote_source.set_now(bar);
            engine.invalidate_quotes();

            let result = engine.scan(&securities, bar).await;
            let mut emitted = result.signals;
            emitted.sort_by(|a, b| a.stock_code.cmp(&b.stock_code));
            debug!(bar = %bar, signals = emitted.len(), "bar replayed");
            all_signals.extend(emitted);
        }

        progress((dates_done + 1) as f64 / dates_total as f64);
    }

    let statistics = compute_statistics(&all_signals);
    info!(signals = statistics.total_signals, "backtest completed");
    Ok(BacktestRun::Completed(BacktestResult {
        statistics,
        signals: all_signals,
        config_echo: config.clone(),
    }))
}

fn compute_statistics(signals: &[TradingSignal]) -> BacktestStatistics {
    let mut stats = BacktestStatistics {
        total_signals: signals.len(),
        ..Default::default()
    };
    for signal in signals {
        match signal.confidence_level {
            ConfidenceLevel::High => stats.high_confidence_count += 1,
            ConfidenceLevel::Medium => stats.medium_confidence_count += 1,
            ConfidenceLevel::Low => stats.low_confidence_count += 1,
        }
        *stats
            .per_date_counts
            .entry(signal.timestamp.date().to_string())
            .or_default() += 1;
    }
    stats
}
