//! Market-facing endpoints: health, status, watchlist quotes, related
//! ETFs, the cached limit-up list and the mapping rebuild admin hook.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::models::{CandidateEtf, Quote};
use crate::watchlist::is_valid_code;

use super::error::ApiError;
use super::routes::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub monitor_running: bool,
    pub is_trading_time: bool,
    pub watchlist_count: usize,
    pub covered_etf_count: usize,
    pub today_signals: i64,
    pub limitup_count: usize,
    pub last_scan_time: Option<NaiveDateTime>,
}

pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let now = Local::now().naive_local();
    let today_signals = state.repository.count_on(now.date())?;
    let limitup_count = limit_up_quotes(&state).await.map(|q| q.len()).unwrap_or(0);

    Ok(Json(StatusResponse {
        monitor_running: state.monitor.is_running(),
        is_trading_time: state.calendar.is_trading_time(now),
        watchlist_count: state.watchlist.len(),
        covered_etf_count: state.mapping.etf_codes().len(),
        today_signals,
        limitup_count,
        last_scan_time: state.monitor.stats().last_scan_time,
    }))
}

/// Latest quotes for every watched security.
pub async fn stocks(State(state): State<AppState>) -> Result<Json<Vec<Quote>>, ApiError> {
    let codes = state.watchlist.codes();
    let quotes = state
        .quotes
        .quotes(&codes)
        .await
        .map_err(|e| ApiError::dependency(format!("quote provider unavailable: {e}")))?;
    Ok(Json(quotes))
}

pub async fn related_etfs(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Vec<CandidateEtf>>, ApiError> {
    if !is_valid_code(&code) {
        return Err(ApiError::validation(format!(
            "'{code}' is not a 6-digit security code"
        )));
    }
    if !state.mapping.contains(&code) {
        return Err(ApiError::not_found(format!("no ETF mapping for {code}")));
    }
    Ok(Json(state.engine.eligible_etfs(&code).await))
}

/// Today's limit-up list among watched securities, cached.
pub async fn limit_up(State(state): State<AppState>) -> Result<Json<Vec<Quote>>, ApiError> {
    let quotes = limit_up_quotes(&state)
        .await
        .map_err(|e| ApiError::dependency(format!("quote provider unavailable: {e}")))?;
    Ok(Json(quotes))
}

async fn limit_up_quotes(state: &AppState) -> anyhow::Result<Vec<Quote>> {
    let ttl = Duration::from_secs(state.config.cache.limit_up_ttl_seconds);
    let codes = state.watchlist.codes();
    let quotes = state.quotes.clone();
    let (list, _) = state
        .limit_up_cache
        .get_or_fill("limit_up:today", ttl, || async move {
            let all = quotes.quotes(&codes).await?;
            Ok(all.into_iter().filter(|q| q.is_limit_up).collect())
        })
        .await?;
    Ok(list)
}

#[derive(Deserialize, Default)]
pub struct RebuildRequest {
    #[serde(default)]
    pub etf_codes: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct RebuildResponse {
    pub etfs_fetched: usize,
    pub etfs_failed: usize,
    pub stocks_covered: usize,
}

/// Admin hook: rebuild the stock-ETF mapping from top holdings and persist
/// it. Lookups never trigger this implicitly.
pub async fn rebuild_mapping(
    State(state): State<AppState>,
    body: Option<Json<RebuildRequest>>,
) -> Result<Json<RebuildResponse>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let etf_codes = request
        .etf_codes
        .unwrap_or_else(|| state.mapping.etf_codes());
    if etf_codes.is_empty() {
        return Err(ApiError::validation(
            "no ETF universe: pass etf_codes or build a mapping first",
        ));
    }

    let summary = state
        .mapping
        .rebuild(&etf_codes, state.holdings.as_ref(), 0.0)
        .await
        .map_err(|e| ApiError::dependency(format!("mapping rebuild failed: {e}")))?;
    state.mapping.save(&state.config.mapping_path)?;

    Ok(Json(RebuildResponse {
        etfs_fetched: summary.etfs_fetched,
        etfs_failed: summary.etfs_failed,
        stocks_covered: summary.stocks_covered,
    }))
}
