//! One-shot scans and the monitor loop lifecycle.

use axum::{extract::State, response::Json};
use chrono::Local;
use serde::Serialize;
use serde_json::{json, Value};

use crate::engine::monitor::MonitorError;

use super::error::ApiError;
use super::routes::AppState;

#[derive(Serialize)]
pub struct ScanResponse {
    pub signals_emitted: usize,
    pub events: usize,
    pub rejected: usize,
    pub errors: usize,
    pub elapsed_ms: u64,
}

pub async fn scan_once(State(state): State<AppState>) -> Result<Json<ScanResponse>, ApiError> {
    let now = Local::now().naive_local();
    let codes = state.watchlist.codes();
    let result = state.engine.scan(&codes, now).await;
    state.monitor.record_scan(now, &result);

    // Every watched security failing to resolve means the provider is down.
    if result.candidates_seen > 0 && result.errors == result.candidates_seen {
        return Err(ApiError::dependency("market data provider unavailable"));
    }

    Ok(Json(ScanResponse {
        signals_emitted: result.signals.len(),
        events: result.events,
        rejected: result.rejections.len(),
        errors: result.errors,
        elapsed_ms: result.elapsed_ms,
    }))
}

pub async fn start_monitor(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.monitor.start() {
        Ok(()) => Ok(Json(json!({ "status": "running" }))),
        Err(MonitorError::AlreadyRunning) => Err(ApiError::conflict("monitor is already running")),
        Err(e) => Err(ApiError::internal(e.to_string())),
    }
}

pub async fn stop_monitor(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.monitor.stop().await {
        Ok(()) => Ok(Json(json!({ "status": "stopped" }))),
        Err(MonitorError::NotRunning) => Err(ApiError::conflict("monitor is not running")),
        Err(e) => Err(ApiError::internal(e.to_string())),
    }
}
