//! Submission ingest endpoint.
//!
//! Accepts a multipart body with a `file` part (the payload, streamed to
//! staging storage without buffering) and a `manifest` part (JSON with the
//! declared SHA-256 and open descriptive metadata). Field order is not
//! guaranteed, so the file is staged as soon as it arrives and only
//! committed once the manifest has been seen.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Json,
};
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tessella_core::{AppError, IngestReceipt};
use tessella_pipeline::Submission;
use tessella_storage::StagedFile;
use tokio_util::io::StreamReader;

use crate::error::HttpAppError;
use crate::state::AppState;

/// The `manifest` multipart part, as submitted by the client.
#[derive(Debug, Deserialize)]
struct SipManifest {
    /// Declared SHA-256 of the payload, hex.
    hash: String,
    /// Open descriptive metadata, stored verbatim.
    #[serde(default)]
    metadata: JsonValue,
}

struct StagedUpload {
    staged: StagedFile,
    filename: String,
    content_type: String,
}

#[tracing::instrument(skip(state, multipart))]
pub async fn ingest_sip(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<IngestReceipt>, HttpAppError> {
    let mut upload: Option<StagedUpload> = None;
    let mut manifest: Option<SipManifest> = None;

    let outcome = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(format!("Malformed multipart body: {}", e)))?
        {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("file") => {
                    let filename = field
                        .file_name()
                        .map(str::to_string)
                        .ok_or_else(|| {
                            AppError::Validation("File part missing a filename".to_string())
                        })?;
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();

                    let body = field.map_err(std::io::Error::other);
                    let reader = StreamReader::new(body);
                    futures::pin_mut!(reader);
                    let staged = state.ingest.stage(&mut reader).await?;

                    if let Some(previous) = upload.replace(StagedUpload {
                        staged,
                        filename,
                        content_type,
                    }) {
                        state.ingest.discard(previous.staged).await;
                        return Err(AppError::Validation(
                            "Duplicate file part".to_string(),
                        ));
                    }
                }
                Some("manifest") => {
                    let text = field.text().await.map_err(|e| {
                        AppError::Validation(format!("Unreadable manifest part: {}", e))
                    })?;
                    manifest = Some(serde_json::from_str(&text).map_err(|e| {
                        AppError::Validation(format!("Malformed manifest JSON: {}", e))
                    })?);
                }
                _ => {}
            }
        }
        Ok(())
    }
    .await;

    if let Err(e) = outcome {
        if let Some(upload) = upload {
            state.ingest.discard(upload.staged).await;
        }
        return Err(e.into());
    }

    let Some(upload) = upload else {
        return Err(AppError::Validation("Missing file part".to_string()).into());
    };
    let Some(manifest) = manifest else {
        state.ingest.discard(upload.staged).await;
        return Err(AppError::Validation("Missing manifest part".to_string()).into());
    };

    let submission = Submission {
        filename: upload.filename,
        content_type: upload.content_type,
        declared_sha256: manifest.hash,
        declared_metadata: manifest.metadata,
    };

    let mut receipt = state.ingest.commit(upload.staged, &submission).await?;

    // Hand masters that need normalization to the conversion queue. The
    // receipt reflects the dispatched state.
    match state.registry.get_by_id(receipt.asset_id).await {
        Ok(Some(asset)) => match state.queue.maybe_enqueue(&asset).await {
            Ok(true) => {
                receipt.status = tessella_core::AssetStatus::Processing;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    asset_id = %receipt.asset_id,
                    error = %e,
                    "Failed to enqueue conversion after ingest"
                );
            }
        },
        Ok(None) => {
            tracing::warn!(asset_id = %receipt.asset_id, "Asset vanished after ingest");
        }
        Err(e) => {
            tracing::warn!(
                asset_id = %receipt.asset_id,
                error = %e,
                "Failed to re-fetch asset after ingest"
            );
        }
    }

    Ok(Json(receipt))
}
