//! Watchlist management endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::WatchEntry;
use crate::watchlist::{is_valid_code, AddOutcome};

use super::error::ApiError;
use super::routes::AppState;

pub async fn list_watchlist(State(state): State<AppState>) -> Json<Vec<WatchEntry>> {
    Json(state.watchlist.list())
}

#[derive(Deserialize)]
pub struct AddRequest {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn add_entry(
    State(state): State<AppState>,
    Json(request): Json<AddRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if !is_valid_code(&request.code) {
        return Err(ApiError::validation(format!(
            "'{}' is not a 6-digit security code",
            request.code
        )));
    }

    let name = request.name.unwrap_or_else(|| request.code.clone());
    match state.watchlist.add(&request.code, &name, request.notes)? {
        AddOutcome::Added => Ok((StatusCode::CREATED, Json(json!({ "status": "success" })))),
        AddOutcome::AlreadyExists => {
            Ok((StatusCode::OK, Json(json!({ "status": "already_exists" }))))
        }
    }
}

pub async fn remove_entry(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.watchlist.remove(&code)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("{code} is not watched")))
    }
}
