use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use onsam_domain::ClientInfo;
use onsam_manager::ReserveRequest;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

// ── Health / version ─────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn version() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

// ── Advertisement ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ResourcesQuery {
    /// When set, only free endpoints are listed.
    #[serde(default)]
    pub available: bool,
}

pub async fn list_resources(
    State(state): State<AppState>,
    Query(query): Query<ResourcesQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut resources = state.manager.get_resources().await?;
    if query.available {
        resources.retain(|r| r.available());
    }
    Ok(Json(json!(resources)))
}

// ── Allocate ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ReserveBody {
    pub slice_urn: String,
    pub resources: Vec<ReserveRequest>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client: ClientInfo,
}

pub async fn reserve(
    State(state): State<AppState>,
    Json(body): Json<ReserveBody>,
) -> Result<Json<Value>, ApiError> {
    if body.resources.is_empty() {
        return Err(ApiError::bad_request("no resources requested"));
    }
    let manifest = state
        .manager
        .reserve_resources(&body.resources, &body.slice_urn, body.end_time, &body.client)
        .await?;
    Ok(Json(json!(manifest)))
}

// ── Describe / status ────────────────────────────────────────────────────────

pub async fn describe_slice(
    State(state): State<AppState>,
    Path(slice_urn): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let manifest = state.manager.get_slice_resources(&slice_urn).await?;
    if manifest.is_empty() {
        return Err(ApiError::search_failed("there are no resources in the given slice"));
    }
    Ok(Json(json!(manifest)))
}

// ── Renew ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RenewBody {
    pub slices: HashMap<String, ClientInfo>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub best_effort: bool,
}

pub async fn renew(
    State(state): State<AppState>,
    Json(body): Json<RenewBody>,
) -> Result<Json<Value>, ApiError> {
    let manifest = if body.best_effort {
        state.manager.force_renew_resources(&body.slices, body.end_time).await?
    } else {
        state.manager.renew_resources(&body.slices, body.end_time).await?
    };
    Ok(Json(json!(manifest)))
}

// ── Operational actions ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ActionBody {
    pub slices: Vec<String>,
    pub action: String,
    #[serde(default)]
    pub best_effort: bool,
}

pub async fn operational_action(
    State(state): State<AppState>,
    Json(body): Json<ActionBody>,
) -> Result<Json<Value>, ApiError> {
    let manager = &state.manager;
    let manifest = match (body.action.as_str(), body.best_effort) {
        ("geni_start", false) => manager.start_slices(&body.slices).await?,
        ("geni_start", true) => manager.force_start_slices(&body.slices).await?,
        ("geni_stop", false) => manager.stop_slices(&body.slices).await?,
        ("geni_stop", true) => manager.force_stop_slices(&body.slices).await?,
        (other, _) => {
            return Err(ApiError::bad_request(format!(
                "unsupported operational action '{other}'"
            )))
        }
    };
    Ok(Json(json!(manifest)))
}

// ── Delete ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DeleteBody {
    pub slices: Vec<String>,
    #[serde(default)]
    pub best_effort: bool,
}

pub async fn delete_slices(
    State(state): State<AppState>,
    Json(body): Json<DeleteBody>,
) -> Result<Json<Value>, ApiError> {
    let manifest = if body.best_effort {
        state.manager.force_delete_slices(&body.slices).await?
    } else {
        state.manager.delete_slices(&body.slices).await?
    };
    Ok(Json(json!(manifest)))
}
