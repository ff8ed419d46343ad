//! Presentation manifest endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value as JsonValue;
use tessella_pipeline::{build_manifest, RequestContext, ResolvedBases};
use uuid::Uuid;

use crate::error::HttpAppError;
use crate::state::AppState;

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn get_manifest(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<JsonValue>, HttpAppError> {
    let asset = state.assets.get(id).await?;

    let ctx = RequestContext {
        forwarded_host: header_str(&headers, "x-forwarded-host"),
        forwarded_proto: header_str(&headers, "x-forwarded-proto"),
        forwarded_prefix: header_str(&headers, "x-forwarded-prefix"),
        host: header_str(&headers, "host"),
    };
    let bases = ResolvedBases::resolve(&state.config, &ctx);

    Ok(Json(build_manifest(&asset, &bases)))
}
