//! Plugin inventories, strategy-chain validation and the sanitized config
//! view.

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::EngineConfig;

use super::error::ApiError;
use super::routes::AppState;

/// Supplemental plugin inventories (evaluators, senders, sources).
pub async fn plugins(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "evaluators": state.registries.evaluators.list(),
        "senders": state.registries.senders.list(),
        "sources": state.registries.sources.list(),
    }))
}

/// Strategy-pipeline inventories.
pub async fn strategies(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "event_detectors": state.registries.event_detectors.list(),
        "fund_selectors": state.registries.fund_selectors.list(),
        "signal_filters": state.registries.signal_filters.list(),
    }))
}

#[derive(Deserialize, Default)]
pub struct ValidateQuery {
    pub event_detector: Option<String>,
    pub fund_selector: Option<String>,
    /// Comma-separated filter names.
    pub signal_filters: Option<String>,
}

/// Validate a chain without building it. Missing parameters fall back to
/// the running configuration.
pub async fn validate_chain(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut config: EngineConfig = state.config.engine.clone();
    if let Some(detector) = query.event_detector {
        config.event_detector = detector;
    }
    if let Some(selector) = query.fund_selector {
        config.fund_selector = selector;
    }
    if let Some(filters) = query.signal_filters {
        config.signal_filters = filters
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    let errors = state.registries.validate(&config);
    Ok(Json(json!({
        "ok": errors.is_empty(),
        "errors": errors,
    })))
}

pub async fn config_view(State(state): State<AppState>) -> Json<Value> {
    Json(state.config.sanitized())
}
