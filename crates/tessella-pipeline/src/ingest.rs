//! Ingest Gateway: content-addressable, streaming, fixity-verified intake.
//!
//! A submission streams into a staging file in fixed-size chunks while a
//! SHA-256 accumulator runs over the bytes; the payload is never buffered
//! whole. Only when the computed digest matches the client-declared one is
//! the staging file promoted and a registry record inserted, together and
//! all-or-nothing. A mismatch discards the staging file and leaves no
//! registry side effect.

use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tessella_core::{meta, AppError, AssetStatus, IngestReceipt, NewAsset};
use tessella_registry::AssetRegistry;
use tessella_storage::{LocalStore, StagedFile};
use tokio::io::AsyncRead;

/// Ingest method recorded in the metadata map.
const INGEST_METHOD_SIP: &str = "sip_bagit";

/// A parsed submission manifest plus the transport-level file attributes.
#[derive(Debug, Clone)]
pub struct Submission {
    pub filename: String,
    pub content_type: String,
    /// Client-declared SHA-256 of the payload, hex, any case.
    pub declared_sha256: String,
    /// Open client-declared metadata, stored verbatim under
    /// `original_metadata`.
    pub declared_metadata: JsonValue,
}

pub struct IngestService {
    registry: Arc<dyn AssetRegistry>,
    store: LocalStore,
    technical: Option<crate::probe::TechnicalMetadataExtractor>,
}

impl IngestService {
    pub fn new(registry: Arc<dyn AssetRegistry>, store: LocalStore) -> Self {
        Self {
            registry,
            store,
            technical: None,
        }
    }

    /// Enable best-effort technical metadata extraction on commit.
    pub fn with_technical_extractor(
        mut self,
        extractor: crate::probe::TechnicalMetadataExtractor,
    ) -> Self {
        self.technical = Some(extractor);
        self
    }

    /// Stream the payload into staging storage, computing its digest on the
    /// way. Multipart field order is not guaranteed, so staging is split
    /// from [`commit`](Self::commit): the caller may stage the file before
    /// it has seen the manifest.
    pub async fn stage<R>(&self, reader: &mut R) -> Result<StagedFile, AppError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        Ok(self.store.stage_stream(reader).await?)
    }

    /// Discard a staged payload that will not be committed.
    pub async fn discard(&self, staged: StagedFile) {
        if let Err(e) = self.store.discard(staged).await {
            tracing::warn!(error = %e, "Failed to discard staging file");
        }
    }

    /// Verify the staged payload against the declared digest and, on a
    /// match, promote it and insert the registry record.
    #[tracing::instrument(skip(self, staged, submission), fields(filename = %submission.filename))]
    pub async fn commit(
        &self,
        staged: StagedFile,
        submission: &Submission,
    ) -> Result<IngestReceipt, AppError> {
        if submission.declared_sha256.is_empty() {
            self.discard(staged).await;
            return Err(AppError::Validation(
                "Manifest missing SHA256 hash".to_string(),
            ));
        }

        let computed = staged.sha256_hex.clone();
        if !computed.eq_ignore_ascii_case(&submission.declared_sha256) {
            let declared = submission.declared_sha256.clone();
            self.discard(staged).await;
            tracing::debug!(
                declared = %declared,
                computed = %computed,
                "Fixity verification failed"
            );
            return Err(AppError::FixityMismatch { declared, computed });
        }

        let file_size = staged.bytes_written as i64;
        let path = self.store.promote(staged, &submission.filename).await?;

        let mut map = serde_json::Map::new();
        map.insert(meta::INGEST_METHOD.to_string(), json!(INGEST_METHOD_SIP));
        map.insert(meta::FIXITY_SHA256.to_string(), json!(computed));
        map.insert(
            meta::ORIGINAL_METADATA.to_string(),
            submission.declared_metadata.clone(),
        );

        // Best-effort raster dimensions. Unknown dimensions are simply
        // absent; the manifest placeholder covers them.
        match crate::probe::image_dimensions(&path).await {
            Ok((width, height)) => {
                map.insert(meta::WIDTH.to_string(), json!(width));
                map.insert(meta::HEIGHT.to_string(), json!(height));
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not extract raster dimensions"
                );
            }
        }

        // Best-effort technical metadata from the external tool.
        if let Some(extractor) = &self.technical {
            match extractor.extract(&path).await {
                Ok(doc) => {
                    map.insert(meta::TECHNICAL_METADATA.to_string(), doc);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Technical metadata extraction failed"
                    );
                }
            }
        }

        let new_asset = NewAsset {
            filename: submission.filename.clone(),
            file_path: path.to_string_lossy().into_owned(),
            file_size,
            content_type: submission.content_type.clone(),
            status: AssetStatus::Ready,
            metadata: Some(JsonValue::Object(map)),
        };

        let asset = match self.registry.create(new_asset).await {
            Ok(asset) => asset,
            Err(e) => {
                // All-or-nothing: a failed insert must not leave the
                // promoted file behind as an unregistered orphan.
                if let Err(cleanup) = self.store.remove(&path).await {
                    tracing::warn!(
                        path = %path.display(),
                        error = %cleanup,
                        "Failed to remove promoted file after insert failure"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            asset_id = %asset.id,
            size_bytes = asset.file_size,
            sha256 = asset.meta_str(meta::FIXITY_SHA256).unwrap_or_default(),
            "Ingest committed"
        );

        Ok(IngestReceipt {
            status: asset.status,
            asset_id: asset.id,
            fixity_check: "PASS".to_string(),
            sha256: asset
                .meta_str(meta::FIXITY_SHA256)
                .unwrap_or_default()
                .to_string(),
            file_size: asset.file_size,
        })
    }

    /// Single-call form of stage + commit for callers that already hold the
    /// full submission.
    pub async fn accept<R>(
        &self,
        reader: &mut R,
        submission: &Submission,
    ) -> Result<IngestReceipt, AppError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let staged = self.stage(reader).await?;
        self.commit(staged, submission).await
    }
}
