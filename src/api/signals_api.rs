//! Signal listing endpoints.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::models::TradingSignal;
use crate::signals::repository::SignalQuery;

use super::error::ApiError;
use super::routes::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct SignalListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    #[serde(default)]
    pub today_only: bool,
    pub stock_code: Option<String>,
    pub etf_code: Option<String>,
    pub event_type: Option<String>,
    /// ISO `YYYY-MM-DD` or compact `YYYYMMDD`.
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Accepts both date formats of the API surface.
pub fn parse_date(text: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y%m%d"))
        .map_err(|_| ApiError::validation(format!("'{text}' is not a date (YYYY-MM-DD or YYYYMMDD)")))
}

fn bounds(query: &SignalListQuery) -> Result<(Option<NaiveDateTime>, Option<NaiveDateTime>), ApiError> {
    if query.today_only {
        let today = Local::now().naive_local().date();
        return Ok((
            Some(today.and_hms_opt(0, 0, 0).unwrap()),
            Some(today.and_hms_opt(23, 59, 59).unwrap()),
        ));
    }

    let start = query
        .start
        .as_deref()
        .map(parse_date)
        .transpose()?
        .map(|d| d.and_hms_opt(0, 0, 0).unwrap());
    let end = query
        .end
        .as_deref()
        .map(parse_date)
        .transpose()?
        .map(|d| d.and_hms_opt(23, 59, 59).unwrap());

    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(ApiError::validation("start is after end"));
        }
    }
    Ok((start, end))
}

pub async fn list_signals(
    State(state): State<AppState>,
    Query(query): Query<SignalListQuery>,
) -> Result<Json<Vec<TradingSignal>>, ApiError> {
    let (start, end) = bounds(&query)?;
    let signals = state.repository.list(&SignalQuery {
        start,
        end,
        stock_code: query.stock_code.clone(),
        etf_code: query.etf_code.clone(),
        event_type: query.event_type.clone(),
        limit: query.limit,
        offset: query.offset,
    })?;
    Ok(Json(signals))
}

pub async fn get_signal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TradingSignal>, ApiError> {
    state
        .repository
        .get(id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("signal {id} not found")))
}
