//! Best-effort collaborators: raster dimension probing and technical
//! metadata extraction.
//!
//! Both are secondary to the operations that call them. A failure here is
//! returned to the caller to inspect and log, and must never abort the
//! primary operation.

use serde_json::Value as JsonValue;
use std::path::Path;
use tokio::process::Command;

/// Read raster dimensions from a file header without decoding the image.
pub async fn image_dimensions(path: &Path) -> anyhow::Result<(u32, u32)> {
    let path = path.to_path_buf();
    let dims = tokio::task::spawn_blocking(move || image::image_dimensions(&path))
        .await
        .map_err(|e| anyhow::anyhow!("Dimension probe task failed: {}", e))??;
    Ok(dims)
}

/// Grouped technical metadata via the external `exiftool` binary.
///
/// Invoked with `-j -g -struct --Binary`: JSON output, grouped by tag family,
/// structured XMP, binary blobs skipped.
#[derive(Clone, Debug)]
pub struct TechnicalMetadataExtractor {
    tool_path: String,
}

impl TechnicalMetadataExtractor {
    pub fn new(tool_path: impl Into<String>) -> Self {
        Self {
            tool_path: tool_path.into(),
        }
    }

    pub async fn extract(&self, path: &Path) -> anyhow::Result<JsonValue> {
        let output = Command::new(&self.tool_path)
            .args(["-j", "-g", "-struct", "--Binary"])
            .arg(path)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run {}: {}", self.tool_path, e))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                self.tool_path,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        // exiftool emits a JSON array with one object per input file.
        let parsed: JsonValue = serde_json::from_slice(&output.stdout)?;
        parsed
            .as_array()
            .and_then(|list| list.first())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{} returned no metadata document", self.tool_path))
    }
}
