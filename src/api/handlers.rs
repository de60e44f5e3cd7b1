//! API Handlers
//!
//! HTTP request handlers for each endpoint of the table cache host.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::cache::CacheKey;
use crate::error::{CacheError, Result};
use crate::lifecycle::TableCache;
use crate::models::{
    DeleteResponse, ErrorResponse, GetResponse, HealthResponse, SetRequest, SetResponse,
    StatsResponse, SweepResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The started table cache
    pub cache: Arc<TableCache>,
}

impl AppState {
    pub fn new(cache: TableCache) -> Self {
        Self::from_shared(Arc::new(cache))
    }

    pub fn from_shared(cache: Arc<TableCache>) -> Self {
        Self { cache }
    }
}

/// Builds the key for a path, rejecting bad segment names before any store call.
fn cache_key(state: &AppState, segment: String, id: String) -> Result<CacheKey> {
    state.cache.validate_segment_name(&segment)?;
    Ok(CacheKey::new(segment, id))
}

/// Handler for GET /cache/:segment/:id
pub async fn get_handler(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
) -> Result<Json<GetResponse>> {
    let key = cache_key(&state, segment, id)?;

    match state.cache.get::<Value>(&key).await? {
        Some(envelope) => Ok(Json(GetResponse::new(key, envelope))),
        None => Err(CacheError::NotFound {
            segment: key.segment,
            id: key.id,
        }),
    }
}

/// Handler for PUT /cache/:segment/:id
pub async fn set_handler(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    let key = cache_key(&state, segment, id)?;
    state.cache.set(&key, &req.value, req.ttl).await?;

    Ok(Json(SetResponse::new(key)))
}

/// Handler for DELETE /cache/:segment/:id
///
/// Succeeds whether or not the entry existed.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>> {
    let key = cache_key(&state, segment, id)?;
    state.cache.remove(&key).await?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /sweep
///
/// Runs one collect pass; 404 when sweeping is disabled.
pub async fn sweep_handler(State(state): State<AppState>) -> Response {
    let Some(sweeper) = state.cache.sweeper() else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("sweeping is disabled")),
        )
            .into_response();
    };

    match sweeper.collect().await {
        Ok(deleted) => Json(SweepResponse { deleted }).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.stats()))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if state.cache.is_ready() {
        (StatusCode::OK, Json(HealthResponse::healthy()))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse::unavailable()),
        )
    }
}
