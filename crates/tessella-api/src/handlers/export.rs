//! Preservation package download endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::error::HttpAppError;
use crate::state::AppState;

#[tracing::instrument(skip(state))]
pub async fn export_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, HttpAppError> {
    let artifact = state.exporter.export(id).await?;

    let headers = [
        (header::CONTENT_TYPE, "application/gzip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.filename),
        ),
    ];

    Ok((headers, artifact.bytes).into_response())
}
