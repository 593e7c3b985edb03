//! Server entrypoint: configuration, tracing, state wiring, HTTP bind.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use etfarb_backend::api::{create_router, AppState};
use etfarb_backend::backtest::driver::BacktestDeps;
use etfarb_backend::backtest::jobs::JobStore;
use etfarb_backend::cache::TtlCache;
use etfarb_backend::config::Config;
use etfarb_backend::engine::monitor::Monitor;
use etfarb_backend::engine::ArbitrageEngine;
use etfarb_backend::mapping::MappingStore;
use etfarb_backend::market::provider::{
    HistoryProvider, HoldingsProvider, HttpMarketSource, QuoteProvider, StaticMarketSource,
};
use etfarb_backend::market::TradingCalendar;
use etfarb_backend::registry::Registries;
use etfarb_backend::signals::repository::SignalRepository;
use etfarb_backend::signals::sender::{LogSender, SignalSender};
use etfarb_backend::watchlist::WatchlistStore;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Arc::new(Config::from_env()?);
    info!(port = config.port, "etfarb backend starting");

    let registries = Arc::new(Registries::with_builtins());
    let calendar = TradingCalendar::new(config.trading_hours);

    // Market data source: the HTTP gateway when configured, otherwise the
    // in-memory source (useful for demos; it serves nothing until fed).
    let (quotes, holdings, history): (
        Arc<dyn QuoteProvider>,
        Arc<dyn HoldingsProvider>,
        Arc<dyn HistoryProvider>,
    ) = if config.quote_api_base.is_empty() {
        warn!("QUOTE_API_BASE is not set; using the in-memory market source");
        let source = StaticMarketSource::new();
        (source.clone(), source.clone(), Arc::new(NoHistory))
    } else {
        let source = Arc::new(
            HttpMarketSource::new(config.quote_api_base.clone(), config.quote_api_key.clone())
                .context("failed to build market source")?,
        );
        (source.clone(), source, Arc::new(NoHistory))
    };

    let repository = Arc::new(SignalRepository::open(&config.database_path)?);
    let watchlist = Arc::new(WatchlistStore::open(&config.watchlist_path)?);

    let mapping = Arc::new(MappingStore::new());
    if std::path::Path::new(&config.mapping_path).exists() {
        mapping.load(&config.mapping_path)?;
    } else {
        warn!(
            path = %config.mapping_path,
            "no mapping document found; POST /api/mapping/rebuild to build one"
        );
    }

    let senders: Vec<Arc<dyn SignalSender>> = vec![Arc::new(LogSender)];
    let engine = Arc::new(ArbitrageEngine::new(
        config.strategy.clone(),
        config.signal_evaluation,
        calendar,
        config.cache,
        &config.engine,
        &registries,
        quotes.clone(),
        quotes.clone(),
        mapping.clone(),
        repository.clone(),
        senders,
    )?);

    let monitor = Monitor::new(
        engine.clone(),
        watchlist.clone(),
        Duration::from_secs(config.strategy.scan_interval_secs),
        Duration::from_secs(config.strategy.shutdown_grace_secs),
    );

    let backtest_deps = Arc::new(BacktestDeps {
        base_config: (*config).clone(),
        registries: registries.clone(),
        history,
    });

    let state = AppState {
        config: config.clone(),
        registries,
        engine,
        monitor: monitor.clone(),
        repository,
        mapping,
        watchlist,
        jobs: JobStore::new(),
        backtest_deps,
        quotes,
        holdings,
        limit_up_cache: Arc::new(TtlCache::new("limit_up", 16)),
        calendar,
    };

    let app = create_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            if monitor.is_running() {
                let _ = monitor.stop().await;
            }
        })
        .await
        .context("server error")?;

    Ok(())
}

/// Placeholder history source until a historical gateway is wired in;
/// backtests against it fail with a clear message instead of fabricating
/// data.
struct NoHistory;

#[async_trait::async_trait]
impl HistoryProvider for NoHistory {
    async fn daily_bars(
        &self,
        code: &str,
        _start: chrono::NaiveDate,
        _end: chrono::NaiveDate,
    ) -> Result<Vec<etfarb_backend::market::provider::DailyBar>> {
        anyhow::bail!("no historical data source configured (requested {code})")
    }

    async fn holdings_snapshots(
        &self,
        _etf_codes: &[String],
        _start: chrono::NaiveDate,
        _end: chrono::NaiveDate,
    ) -> Result<
        std::collections::BTreeMap<chrono::NaiveDate, Vec<etfarb_backend::models::EtfHoldings>>,
    > {
        anyhow::bail!("no historical data source configured")
    }
}
