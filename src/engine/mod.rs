//! The arbitrage engine: one scan sweeps the watchlist, drives the strategy
//! pipeline per security, and persists whatever survives the filter chain.

pub mod monitor;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::NaiveDateTime;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::TtlCache;
use crate::config::{CacheConfig, EngineConfig, SignalEvaluationConfig, StrategyConfig};
use crate::market::provider::QuoteProvider;
use crate::market::TradingCalendar;
use crate::mapping::MappingStore;
use crate::models::{CandidateEtf, Quote, TradingSignal};
use crate::registry::{Registries, StrategyChain};
use crate::signals::repository::SignalRepository;
use crate::signals::sender::SignalSender;
use crate::strategy::{scoring, FilterContext};

/// One rejected candidate with the reason the pipeline gave.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub stock_code: String,
    pub reason: String,
}

/// Outcome of one scan sweep. Signals appear in per-security completion
/// order, not watchlist order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    pub candidates_seen: usize,
    pub events: usize,
    pub signals: Vec<TradingSignal>,
    pub rejections: Vec<Rejection>,
    pub errors: usize,
    pub elapsed_ms: u64,
}

enum Outcome {
    NoEvent,
    Rejected(Rejection),
    Emitted(TradingSignal),
    Failed,
}

pub struct ArbitrageEngine {
    strategy: StrategyConfig,
    evaluation: SignalEvaluationConfig,
    calendar: TradingCalendar,
    chain: StrategyChain,
    min_weight: f64,
    stock_quotes: Arc<dyn QuoteProvider>,
    etf_quotes: Arc<dyn QuoteProvider>,
    mapping: Arc<MappingStore>,
    repository: Arc<SignalRepository>,
    quote_cache: TtlCache<Quote>,
    quote_ttl: Duration,
    senders: Vec<Arc<dyn SignalSender>>,
}

impl ArbitrageEngine {
    /// Build an engine for the given strategy chain. Refuses when the chain
    /// fails registry validation.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy: StrategyConfig,
        evaluation: SignalEvaluationConfig,
        calendar: TradingCalendar,
        cache_config: CacheConfig,
        engine_config: &EngineConfig,
        registries: &Registries,
        stock_quotes: Arc<dyn QuoteProvider>,
        etf_quotes: Arc<dyn QuoteProvider>,
        mapping: Arc<MappingStore>,
        repository: Arc<SignalRepository>,
        senders: Vec<Arc<dyn SignalSender>>,
    ) -> Result<Self> {
        let chain = registries.build_chain(engine_config)?;
        let min_weight = engine_config.min_weight();
        Ok(Self {
            strategy,
            evaluation,
            calendar,
            chain,
            min_weight,
            stock_quotes,
            etf_quotes,
            mapping,
            repository,
            quote_cache: TtlCache::new("quotes", cache_config.max_entries),
            quote_ttl: Duration::from_secs(cache_config.quote_ttl_seconds),
            senders,
        })
    }

    pub fn min_weight(&self) -> f64 {
        self.min_weight
    }

    pub fn calendar(&self) -> TradingCalendar {
        self.calendar
    }

    /// Eligible ETFs for a stock: mapped entries at or above `min_weight`,
    /// enriched with the latest ETF quote when available.
    pub async fn eligible_etfs(&self, stock_code: &str) -> Vec<CandidateEtf> {
        let mut candidates: Vec<CandidateEtf> = self
            .mapping
            .etfs_for(stock_code)
            .iter()
            .filter(|e| e.weight >= self.min_weight)
            .map(|e| e.to_candidate())
            .collect();

        for candidate in &mut candidates {
            let code = candidate.etf_code.clone();
            let fetched = self
                .quote_cache
                .get_or_fill(&format!("etf:{code}"), self.quote_ttl, || async {
                    self.etf_quotes.quote(&code).await
                })
                .await;
            match fetched {
                Ok((quote, _)) => {
                    candidate.daily_amount = quote.amount;
                    candidate.quote = Some(quote);
                }
                Err(e) => debug!(etf = %candidate.etf_code, error = %e, "ETF quote unavailable"),
            }
        }
        candidates
    }

    /// Sweep the watched securities once. Per-security failures never abort
    /// the sweep; a provider-wide outage shows up as a scan with zero
    /// events and an error per security.
    pub async fn scan(&self, watched: &[String], now: NaiveDateTime) -> ScanResult {
        let started = Instant::now();
        let mut result = ScanResult {
            candidates_seen: watched.len(),
            ..Default::default()
        };

        // Warm the quote cache in one batch before fanning out.
        match self.stock_quotes.quotes(watched).await {
            Ok(quotes) => {
                for quote in quotes {
                    self.quote_cache
                        .put(&format!("stock:{}", quote.code), quote, self.quote_ttl);
                }
            }
            Err(e) => warn!(error = %e, "batch quote fetch failed; falling back per security"),
        }

        let concurrency = self.strategy.scan_concurrency.min(watched.len()).max(1);
        let mut scans: Vec<std::pin::Pin<Box<dyn std::future::Future<Output = Outcome> + Send + '_>>> =
            Vec::with_capacity(watched.len());
        for code in watched.iter() {
            scans.push(Box::pin(self.scan_security(code, now)));
        }
        let outcomes: Vec<Outcome> = stream::iter(scans).buffer_unordered(concurrency).collect().await;

        for outcome in outcomes {
            match outcome {
                Outcome::NoEvent => {}
                Outcome::Rejected(rejection) => result.rejections.push(rejection),
                Outcome::Emitted(signal) => {
                    result.events += 1;
                    result.signals.push(signal);
                }
                Outcome::Failed => result.errors += 1,
            }
        }
        // Every rejection had a detected event behind it.
        result.events += result.rejections.len();

        result.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            scanned = result.candidates_seen,
            events = result.events,
            signals = result.signals.len(),
            rejected = result.rejections.len(),
            errors = result.errors,
            elapsed_ms = result.elapsed_ms,
            "scan complete"
        );
        result
    }

    async fn scan_security(&self, code: &str, now: NaiveDateTime) -> Outcome {
        let quote = match self
            .quote_cache
            .get_or_fill(&format!("stock:{code}"), self.quote_ttl, || async {
                self.stock_quotes.quote(code).await
            })
            .await
        {
            Ok((quote, _)) => quote,
            Err(e) => {
                debug!(code, error = %e, "quote unavailable");
                return Outcome::Failed;
            }
        };

        let Some(event) = self.chain.detector.detect(&quote) else {
            return Outcome::NoEvent;
        };

        if !self.chain.detector.is_valid(&event) {
            return Outcome::Rejected(Rejection {
                stock_code: code.to_string(),
                reason: "event invalid".to_string(),
            });
        }

        let eligible = self.eligible_etfs(code).await;
        if eligible.is_empty() {
            return Outcome::Rejected(Rejection {
                stock_code: code.to_string(),
                reason: format!("no eligible ETF (weights below {})", self.min_weight),
            });
        }

        let Some(fund) = self.chain.selector.select(&eligible, &event) else {
            return Outcome::Rejected(Rejection {
                stock_code: code.to_string(),
                reason: "selector returned none".to_string(),
            });
        };

        // A selector can only pick from what it was handed.
        if !eligible.iter().any(|c| c.etf_code == fund.etf_code) {
            error!(
                selector = self.chain.selector.name(),
                stock = code,
                etf = %fund.etf_code,
                "selector returned an ETF outside the eligible list; dropping signal"
            );
            return Outcome::Failed;
        }

        let ctx = FilterContext {
            now,
            calendar: self.calendar,
            evaluation: self.evaluation,
        };
        let selection_reason = self.chain.selector.selection_reason(&fund);
        let mut draft = scoring::draft_signal(&ctx, &event, &fund, &selection_reason);

        for filter in &self.chain.filters {
            let verdict = filter.check(&ctx, &event, &fund, &draft);
            if !verdict.pass {
                if filter.is_required() || !self.strategy.bypass_optional_filters {
                    return Outcome::Rejected(Rejection {
                        stock_code: code.to_string(),
                        reason: verdict.note,
                    });
                }
                warn!(filter = filter.name(), stock = code, note = %verdict.note, "optional filter bypassed");
                continue;
            }
            if !verdict.note.is_empty() {
                draft.reason.push_str("; ");
                draft.reason.push_str(filter.name());
                draft.reason.push_str(": ");
                draft.reason.push_str(&verdict.note);
            }
        }

        match self.repository.insert(&draft) {
            Ok(id) => draft.id = Some(id),
            Err(e) => {
                error!(stock = code, error = %e, "signal not persisted");
                return Outcome::Rejected(Rejection {
                    stock_code: code.to_string(),
                    reason: format!("storage error: {e}"),
                });
            }
        }

        for sender in &self.senders {
            if let Err(e) = sender.send(&draft) {
                warn!(sender = sender.name(), error = %e, "notification failed");
            }
        }

        Outcome::Emitted(draft)
    }

    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.quote_cache.stats()
    }

    /// Drop every cached quote. Replays call this between bars so a pinned
    /// clock never observes the previous bar's prices.
    pub fn invalidate_quotes(&self) {
        self.quote_cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mapping::{MappedEtf, MappingDocument, MappingStore};
    use crate::market::provider::StaticMarketSource;
    use crate::models::ConfidenceLevel;

    fn quote(code: &str, name: &str, prev_close: f64, price: f64, change_pct: f64, ts: &str) -> Quote {
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
            limit_time: Some("2026-03-05T13:41:00".parse().unwrap()),
            seal_amount: 1.2e9,
            open_count: 0,
            is_first_limit: true,
        }
    }

    fn etf_quote(code: &str, amount: f64, ts: &str) -> Quote {
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

    fn mapping_with(stock: &str, entries: &[(&str, f64, u32)]) -> Arc<MappingStore> {
        let mut document = MappingDocument::new();
        document.insert(
            stock.to_string(),
            entries
                .iter()
                .map(|(code, weight, rank)| MappedEtf {
                    etf_code: (*code).to_string(),
                    etf_name: format!("ETF {code}"),
                    weight: *weight,
                    rank: *rank,
                    top10_ratio: 0.55,
                })
                .collect(),
        );
        Arc::new(MappingStore::from_document(document))
    }

    fn build_engine(
        source: Arc<StaticMarketSource>,
        mapping: Arc<MappingStore>,
    ) -> (ArbitrageEngine, Arc<SignalRepository>) {
        let config = Config::from_env().unwrap();
        let registries = Registries::with_builtins();
        let repository = Arc::new(SignalRepository::in_memory().unwrap());
        let engine = ArbitrageEngine::new(
            config.strategy.clone(),
            config.signal_evaluation,
            TradingCalendar::default(),
            config.cache,
            &config.engine,
            &registries,
            source.clone(),
            source,
            mapping,
            repository.clone(),
            Vec::new(),
        )
        .unwrap();
        (engine, repository)
    }

    #[tokio::test]
    async fn canonical_limit_up_emits_high_confidence_signal() {
        let source = StaticMarketSource::new();
        source.put_quote(quote(
            "600519",
            "Moutai",
            1800.0,
            1980.0,
            0.0999,
            "2026-03-05T14:05:00",
        ));
        source.put_quote_raw(etf_quote("510300", 8.0e8, "2026-03-05T14:05:00"));
        let mapping = mapping_with("600519", &[("510300", 0.085, 5)]);

        let (engine, repo) = build_engine(source, mapping);
        let result = engine
            .scan(&["600519".into()], "2026-03-05T14:05:00".parse().unwrap())
            .await;

        assert_eq!(result.signals.len(), 1, "rejections: {:?}", result.rejections);
        let signal = &result.signals[0];
        assert_eq!(signal.confidence_level, ConfidenceLevel::High);
        assert_eq!(signal.risk_level.as_str(), "medium");
        assert!(signal.reason.contains("weight 8.50%"));
        assert_eq!(signal.id, Some(1));
        assert_eq!(repo.count(&Default::default()).unwrap(), 1);
    }

    #[tokio::test]
    async fn time_filter_rejects_late_scan() {
        let source = StaticMarketSource::new();
        source.put_quote(quote(
            "600519",
            "Moutai",
            1800.0,
            1980.0,
            0.0999,
            "2026-03-05T14:45:00",
        ));
        source.put_quote_raw(etf_quote("510300", 8.0e8, "2026-03-05T14:45:00"));
        let mapping = mapping_with("600519", &[("510300", 0.085, 5)]);

        let (engine, repo) = build_engine(source, mapping);
        let result = engine
            .scan(&["600519".into()], "2026-03-05T14:45:00".parse().unwrap())
            .await;

        assert!(result.signals.is_empty());
        assert_eq!(result.rejections.len(), 1);
        assert_eq!(result.rejections[0].reason, "time to close 900s < 1800s");
        assert_eq!(repo.count(&Default::default()).unwrap(), 0);
    }

    #[tokio::test]
    async fn low_weights_leave_no_eligible_etf() {
        let source = StaticMarketSource::new();
        source.put_quote(quote(
            "601012",
            "Longi",
            20.0,
            22.0,
            0.10,
            "2026-03-05T10:10:00",
        ));
        let mapping = mapping_with("601012", &[("510300", 0.03, 9), ("515790", 0.04, 7)]);

        let (engine, _) = build_engine(source, mapping);
        let result = engine
            .scan(&["601012".into()], "2026-03-05T10:10:00".parse().unwrap())
            .await;

        assert!(result.signals.is_empty());
        assert_eq!(result.rejections.len(), 1);
        assert_eq!(
            result.rejections[0].reason,
            "no eligible ETF (weights below 0.05)"
        );
    }

    #[tokio::test]
    async fn weight_exactly_at_min_is_eligible() {
        let source = StaticMarketSource::new();
        source.put_quote(quote(
            "600519",
            "Moutai",
            1800.0,
            1980.0,
            0.0999,
            "2026-03-05T10:05:00",
        ));
        source.put_quote_raw(etf_quote("510300", 8.0e8, "2026-03-05T10:05:00"));
        let mapping = mapping_with("600519", &[("510300", 0.05, 5)]);

        let (engine, _) = build_engine(source, mapping);
        let result = engine
            .scan(&["600519".into()], "2026-03-05T10:05:00".parse().unwrap())
            .await;
        assert_eq!(result.signals.len(), 1, "rejections: {:?}", result.rejections);
    }

    #[tokio::test]
    async fn provider_outage_counts_errors_without_aborting() {
        let source = StaticMarketSource::new();
        let mapping = Arc::new(MappingStore::new());
        let (engine, _) = build_engine(source, mapping);
        let result = engine
            .scan(
                &["600519".into(), "601012".into()],
                "2026-03-05T10:05:00".parse().unwrap(),
            )
            .await;
        assert_eq!(result.errors, 2);
        assert_eq!(result.events, 0);
        assert!(result.signals.is_empty());
    }

    #[tokio::test]
    async fn non_pinned_quotes_produce_no_event() {
        let source = StaticMarketSource::new();
        source.put_quote(quote(
            "600519",
            "Moutai",
            1800.0,
            1850.0,
            0.0278,
            "2026-03-05T10:05:00",
        ));
        let mapping = mapping_with("600519", &[("510300", 0.085, 5)]);
        let (engine, _) = build_engine(source, mapping);
        let result = engine
            .scan(&["600519".into()], "2026-03-05T10:05:00".parse().unwrap())
            .await;
        assert_eq!(result.events, 0);
        assert!(result.rejections.is_empty());
    }
}
