//! Backtest job endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::backtest::driver::BacktestConfig;
use crate::backtest::jobs::{BacktestJob, JobStatus, ResultLookup};
use crate::backtest::templates;
use crate::signals::export::signals_to_csv;

use super::error::ApiError;
use super::routes::AppState;

fn parse_job_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::not_found(format!("unknown backtest job '{id}'")))
}

/// Submit a job. Returns 202 with the job id; execution is asynchronous.
pub async fn start_backtest(
    State(state): State<AppState>,
    Json(config): Json<BacktestConfig>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    config
        .validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let job_id = state
        .jobs
        .start(
            config,
            state.backtest_deps.clone(),
            state.watchlist.codes(),
            state.mapping.etf_codes(),
        )
        .map_err(|e| ApiError::validation(e.to_string()))?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))))
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BacktestJob>, ApiError> {
    let job_id = parse_job_id(&id)?;
    state
        .jobs
        .get(job_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("unknown backtest job '{id}'")))
}

pub async fn job_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let job_id = parse_job_id(&id)?;
    match state.jobs.result(job_id) {
        ResultLookup::NotFound => Err(ApiError::not_found(format!("unknown backtest job '{id}'"))),
        ResultLookup::NotReady(status) => Err(ApiError::conflict(format!(
            "backtest job is {}, result not ready",
            serde_json::to_value(status)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()
        ))),
        ResultLookup::Ready(result) => Ok(Json(*result).into_response()),
    }
}

#[derive(Deserialize, Default)]
pub struct SignalsQuery {
    /// `csv` (default) or `json`.
    pub format: Option<String>,
}

pub async fn job_signals(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SignalsQuery>,
) -> Result<Response, ApiError> {
    let job_id = parse_job_id(&id)?;
    let signals = state
        .jobs
        .signals(job_id)
        .ok_or_else(|| ApiError::not_found(format!("unknown backtest job '{id}'")))?;

    if query.format.as_deref() == Some("json") {
        return Ok(Json(signals).into_response());
    }

    let csv = signals_to_csv(&signals);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"backtest_signals.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

#[derive(Deserialize, Default)]
pub struct JobListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub status: Option<String>,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<Vec<BacktestJob>>, ApiError> {
    let status = match query.status.as_deref() {
        None => None,
        Some("queued") => Some(JobStatus::Queued),
        Some("running") => Some(JobStatus::Running),
        Some("completed") => Some(JobStatus::Completed),
        Some("failed") => Some(JobStatus::Failed),
        Some("cancelled") => Some(JobStatus::Cancelled),
        Some(other) => {
            return Err(ApiError::validation(format!("unknown status '{other}'")));
        }
    };
    Ok(Json(state.jobs.list(
        query.limit.unwrap_or(20),
        query.offset.unwrap_or(0),
        status,
    )))
}

/// Cancel a live job or delete a finished one.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let job_id = parse_job_id(&id)?;
    if state.jobs.cancel(job_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("unknown backtest job '{id}'")))
    }
}

pub async fn list_templates() -> Json<serde_json::Value> {
    Json(json!({ "templates": templates::TEMPLATES }))
}
