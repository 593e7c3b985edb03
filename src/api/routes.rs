//! Router assembly and shared application state.

use std::sync::Arc;

use axum::{
    middleware as axum_mw,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::backtest::driver::BacktestDeps;
use crate::backtest::jobs::JobStore;
use crate::cache::TtlCache;
use crate::config::Config;
use crate::engine::monitor::Monitor;
use crate::engine::ArbitrageEngine;
use crate::mapping::MappingStore;
use crate::market::provider::{HoldingsProvider, QuoteProvider};
use crate::market::TradingCalendar;
use crate::models::Quote;
use crate::registry::Registries;
use crate::signals::repository::SignalRepository;
use crate::watchlist::WatchlistStore;

use super::middleware::request_logging;
use super::{backtest_api, market_api, monitor_api, signals_api, strategy_api, watchlist_api};

/// Shared application state. Everything inside is an `Arc` handle; the
/// coordinator-owned pieces (monitor, job store) serialize their own
/// mutations.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registries: Arc<Registries>,
    pub engine: Arc<ArbitrageEngine>,
    pub monitor: Arc<Monitor>,
    pub repository: Arc<SignalRepository>,
    pub mapping: Arc<MappingStore>,
    pub watchlist: Arc<WatchlistStore>,
    pub jobs: Arc<JobStore>,
    pub backtest_deps: Arc<BacktestDeps>,
    pub quotes: Arc<dyn QuoteProvider>,
    pub holdings: Arc<dyn HoldingsProvider>,
    pub limit_up_cache: Arc<TtlCache<Vec<Quote>>>,
    pub calendar: TradingCalendar,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(market_api::health))
        .route("/api/status", get(market_api::status))
        .route("/api/stocks", get(market_api::stocks))
        .route("/api/stocks/:code/related-etfs", get(market_api::related_etfs))
        .route("/api/limit-up", get(market_api::limit_up))
        .route("/api/mapping/rebuild", post(market_api::rebuild_mapping))
        .route("/api/signals", get(signals_api::list_signals))
        .route("/api/signals/:id", get(signals_api::get_signal))
        .route("/api/monitor/scan", post(monitor_api::scan_once))
        .route("/api/monitor/start", post(monitor_api::start_monitor))
        .route("/api/monitor/stop", post(monitor_api::stop_monitor))
        .route("/api/backtest/start", post(backtest_api::start_backtest))
        .route("/api/backtest/jobs", get(backtest_api::list_jobs))
        .route("/api/backtest/templates", get(backtest_api::list_templates))
        .route(
            "/api/backtest/:id",
            get(backtest_api::job_status).delete(backtest_api::cancel_job),
        )
        .route("/api/backtest/:id/result", get(backtest_api::job_result))
        .route("/api/backtest/:id/signals", get(backtest_api::job_signals))
        .route("/api/watchlist", get(watchlist_api::list_watchlist))
        .route("/api/watchlist/add", post(watchlist_api::add_entry))
        .route("/api/watchlist/:code", delete(watchlist_api::remove_entry))
        .route("/api/plugins", get(strategy_api::plugins))
        .route("/api/strategies", get(strategy_api::strategies))
        .route("/api/strategies/validate", get(strategy_api::validate_chain))
        .route("/api/config", get(strategy_api::config_view))
        .layer(axum_mw::from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
