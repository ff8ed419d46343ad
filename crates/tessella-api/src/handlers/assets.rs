//! Asset registry read and delete endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tessella_core::Asset;
use uuid::Uuid;

use crate::error::HttpAppError;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    offset: i64,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AssetListResponse {
    pub items: Vec<Asset>,
    pub total: i64,
}

pub async fn list_assets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<AssetListResponse>, HttpAppError> {
    let offset = query.offset.max(0);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let items = state.assets.list(offset, limit).await?;
    let total = state.registry.count().await?;

    Ok(Json(AssetListResponse { items, total }))
}

pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Asset>, HttpAppError> {
    let asset = state.assets.get(id).await?;
    Ok(Json(asset))
}

pub async fn delete_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HttpAppError> {
    state.assets.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
