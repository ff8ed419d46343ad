//! Conversion Orchestrator: async normalization of masters into pyramidal
//! tiled derivatives.
//!
//! Jobs are fed through a bounded channel into a worker pool capped by a
//! semaphore. The worker owns the Processing -> {Ready, Error} transition
//! and the locator rewrite exclusively; nothing else mutates status.
//! Conversion failures never propagate to a caller — they are captured into
//! the asset's own record, observable only via the registry.
//!
//! Duplicate dispatch for the same asset is tolerated: the engine overwrites
//! its output, so duplicates are wasteful, not corrupting. No per-asset
//! mutual exclusion is taken.

use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessella_core::constants::DERIVATIVE_EXTENSION;
use tessella_core::{meta, AppError, Asset, AssetStatus};
use tessella_registry::AssetRegistry;
use tokio::sync::{mpsc, watch, Semaphore};
use uuid::Uuid;

use crate::engine::RasterEngine;

#[derive(Clone, Debug)]
pub struct ConversionQueueConfig {
    pub worker_count: usize,
    /// Submit-side channel depth; the only backpressure the queue applies.
    pub queue_depth: usize,
    /// File extensions (lowercase, no dot) whose masters require
    /// normalization.
    pub convert_extensions: Vec<String>,
}

impl Default for ConversionQueueConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            queue_depth: 64,
            convert_extensions: vec!["psb".to_string(), "psd".to_string()],
        }
    }
}

/// A dispatched normalization job: asset identity plus the master's locator
/// at enqueue time.
#[derive(Debug, Clone)]
struct ConversionJob {
    asset_id: Uuid,
    master_path: PathBuf,
}

pub struct ConversionQueue {
    registry: Arc<dyn AssetRegistry>,
    config: ConversionQueueConfig,
    tx: mpsc::Sender<ConversionJob>,
    shutdown_tx: watch::Sender<bool>,
}

impl ConversionQueue {
    /// Create the queue and spawn its worker pool. Dropping the queue closes
    /// the channel; in-flight jobs run to completion.
    pub fn new(
        registry: Arc<dyn AssetRegistry>,
        engine: Arc<dyn RasterEngine>,
        config: ConversionQueueConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_depth);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker_registry = registry.clone();
        let worker_count = config.worker_count;
        tokio::spawn(async move {
            Self::worker_pool(worker_registry, engine, worker_count, rx, shutdown_rx).await;
        });

        Self {
            registry,
            config,
            tx,
            shutdown_tx,
        }
    }

    /// Stop the worker pool. Already-spawned jobs run to completion; further
    /// `enqueue` calls fail without leaving the asset in Processing.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Whether a stored filename's extension is configured for
    /// normalization.
    pub fn requires_conversion(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.config.convert_extensions.iter().any(|c| *c == ext)
            })
            .unwrap_or(false)
    }

    /// Enqueue the asset when its master requires normalization. Returns
    /// whether a job was dispatched.
    pub async fn maybe_enqueue(&self, asset: &Asset) -> Result<bool, AppError> {
        if !self.requires_conversion(asset.current_storage_filename()) {
            return Ok(false);
        }
        self.enqueue(asset.id).await?;
        Ok(true)
    }

    /// Explicitly (re)enqueue a conversion. This is the only path by which
    /// a Ready asset re-enters Processing.
    #[tracing::instrument(skip(self))]
    pub async fn enqueue(&self, asset_id: Uuid) -> Result<(), AppError> {
        let mut asset = self
            .registry
            .get_by_id(asset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset {}", asset_id)))?;

        let master_path = PathBuf::from(&asset.file_path);
        let previous_status = asset.status;

        asset.status = AssetStatus::Processing;
        self.registry.update(&asset).await?;

        if self
            .tx
            .send(ConversionJob {
                asset_id,
                master_path,
            })
            .await
            .is_err()
        {
            // No worker will ever pick this up; restore the prior status so
            // the record does not sit in Processing forever.
            asset.status = previous_status;
            if let Err(e) = self.registry.update(&asset).await {
                tracing::error!(
                    asset_id = %asset_id,
                    error = %e,
                    "Failed to restore status after dispatch failure"
                );
            }
            return Err(AppError::Internal("Conversion queue is closed".to_string()));
        }

        tracing::info!(asset_id = %asset_id, "Conversion enqueued");
        Ok(())
    }

    async fn worker_pool(
        registry: Arc<dyn AssetRegistry>,
        engine: Arc<dyn RasterEngine>,
        worker_count: usize,
        mut rx: mpsc::Receiver<ConversionJob>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        tracing::info!(worker_count, "Conversion worker pool started");
        let semaphore = Arc::new(Semaphore::new(worker_count));

        loop {
            let job = tokio::select! {
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
                _ = shutdown_rx.changed() => break,
            };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                // The semaphore is never closed while the pool runs.
                Err(_) => break,
            };

            let registry = registry.clone();
            let engine = engine.clone();
            tokio::spawn(async move {
                run_job(registry, engine, job).await;
                drop(permit);
            });
        }

        tracing::info!("Conversion worker pool stopped");
    }
}

/// Execute one job and settle the asset into a terminal state. Errors are
/// captured into the record, never returned.
async fn run_job(
    registry: Arc<dyn AssetRegistry>,
    engine: Arc<dyn RasterEngine>,
    job: ConversionJob,
) {
    tracing::info!(
        asset_id = %job.asset_id,
        master = %job.master_path.display(),
        "Starting conversion"
    );

    let output_path = job.master_path.with_extension(DERIVATIVE_EXTENSION);

    let outcome = engine.normalize(&job.master_path, &output_path).await;

    // Re-fetch before writing: the external call above may have taken a long
    // time and the row may have gained metadata in the meantime.
    let asset = match registry.get_by_id(job.asset_id).await {
        Ok(Some(asset)) => asset,
        Ok(None) => {
            tracing::warn!(asset_id = %job.asset_id, "Asset vanished during conversion");
            return;
        }
        Err(e) => {
            tracing::error!(asset_id = %job.asset_id, error = %e, "Failed to re-fetch asset after conversion");
            return;
        }
    };

    let updated = match outcome {
        Ok(info) => {
            let mut asset = asset;
            asset.set_meta(
                meta::ORIGINAL_FILE_PATH,
                json!(job.master_path.to_string_lossy()),
            );
            asset.set_meta(meta::CONVERSION_METHOD, json!(engine.method_name()));
            if info.width > 0 && info.height > 0 {
                asset.set_meta(meta::WIDTH, json!(info.width));
                asset.set_meta(meta::HEIGHT, json!(info.height));
            }
            asset.file_path = output_path.to_string_lossy().into_owned();
            asset.status = AssetStatus::Ready;

            tracing::info!(
                asset_id = %asset.id,
                derivative = %asset.file_path,
                "Conversion succeeded"
            );
            asset
        }
        Err(e) => {
            // Leave the locator untouched: the record stays queryable with a
            // visible failure flag, not corrupted.
            let mut asset = asset;
            asset.set_meta(meta::ERROR_MESSAGE, json!(e.to_string()));
            asset.status = AssetStatus::Error;

            tracing::warn!(asset_id = %asset.id, error = %e, "Conversion failed");
            asset
        }
    };

    if let Err(e) = registry.update(&updated).await {
        tracing::error!(
            asset_id = %updated.id,
            error = %e,
            "Failed to persist conversion result"
        );
    }
}
