//! The raster normalization engine collaborator.
//!
//! The conversion orchestrator treats decode/tile/pyramid generation as a
//! black box behind [`RasterEngine`]. The production implementation shells
//! out to the `vips` CLI, which opens masters in sequential access mode and
//! never decodes very large files fully into memory.

use async_trait::async_trait;
use std::path::Path;
use tessella_core::constants::DERIVATIVE_TILE_SIZE;
use tessella_core::AppError;
use tokio::process::Command;

use crate::probe;

/// Dimensions read back from a produced derivative. Zero means the engine
/// could not determine them; callers treat zero as unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterInfo {
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait RasterEngine: Send + Sync {
    /// Identifier recorded in the asset's `conversion_method` metadata.
    fn method_name(&self) -> &'static str;

    /// Normalize `input` into a pyramidal, tiled, losslessly compressed
    /// derivative at `output`, overwriting any existing file there.
    async fn normalize(&self, input: &Path, output: &Path) -> Result<RasterInfo, AppError>;
}

/// Production engine: libvips via its CLI.
///
/// Deflate compression is deliberate: some consuming viewers reject very
/// large transform-coded (JPEG-in-TIFF) tiles, and deflate keeps the
/// derivative lossless. BigTIFF lifts the 4 GiB container limit.
#[derive(Clone, Debug)]
pub struct VipsCliEngine {
    vips_path: String,
}

impl VipsCliEngine {
    pub fn new(vips_path: impl Into<String>) -> Self {
        Self {
            vips_path: vips_path.into(),
        }
    }
}

#[async_trait]
impl RasterEngine for VipsCliEngine {
    fn method_name(&self) -> &'static str {
        "vips_pyramidal_bigtiff"
    }

    async fn normalize(&self, input: &Path, output: &Path) -> Result<RasterInfo, AppError> {
        let tile = DERIVATIVE_TILE_SIZE.to_string();
        let result = Command::new(&self.vips_path)
            .arg("tiffsave")
            .arg(input)
            .arg(output)
            .args(["--compression", "deflate"])
            .args(["--tile", "--tile-width", &tile, "--tile-height", &tile])
            .args(["--pyramid", "--bigtiff"])
            .output()
            .await
            .map_err(|e| {
                AppError::Conversion(format!("Failed to run {}: {}", self.vips_path, e))
            })?;

        if !result.status.success() {
            return Err(AppError::Conversion(format!(
                "{} tiffsave exited with {}: {}",
                self.vips_path,
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        // Read dimensions back from the produced derivative. Failure to read
        // them does not fail the conversion; the derivative is still good.
        match probe::image_dimensions(output).await {
            Ok((width, height)) => Ok(RasterInfo { width, height }),
            Err(e) => {
                tracing::warn!(
                    path = %output.display(),
                    error = %e,
                    "Could not read dimensions from derivative"
                );
                Ok(RasterInfo {
                    width: 0,
                    height: 0,
                })
            }
        }
    }
}

/// Engine that copies the master byte-for-byte and reports fixed dimensions.
/// Used by tests and as a stand-in when libvips is unavailable in
/// development.
#[derive(Clone, Debug)]
pub struct CopyRasterEngine {
    pub info: RasterInfo,
}

impl CopyRasterEngine {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            info: RasterInfo { width, height },
        }
    }
}

#[async_trait]
impl RasterEngine for CopyRasterEngine {
    fn method_name(&self) -> &'static str {
        "copy"
    }

    async fn normalize(&self, input: &Path, output: &Path) -> Result<RasterInfo, AppError> {
        tokio::fs::copy(input, output)
            .await
            .map_err(|e| AppError::Conversion(format!("Copy failed: {}", e)))?;
        Ok(self.info)
    }
}

/// Engine that always fails. Used by tests exercising the error transition.
#[derive(Clone, Debug)]
pub struct FailingRasterEngine {
    pub message: String,
}

impl FailingRasterEngine {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl RasterEngine for FailingRasterEngine {
    fn method_name(&self) -> &'static str {
        "failing"
    }

    async fn normalize(&self, _input: &Path, _output: &Path) -> Result<RasterInfo, AppError> {
        Err(AppError::Conversion(self.message.clone()))
    }
}
