use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Well-known keys in the open metadata map.
///
/// The map itself is schemaless JSON; these constants name the keys the
/// pipeline reads and writes. Anything else in the map is client-supplied
/// and passed through untouched.
pub mod meta {
    /// How the asset entered the system (e.g. `sip_bagit`).
    pub const INGEST_METHOD: &str = "ingest_method";
    /// SHA-256 of the *original master* bytes, recorded at ingest. Still
    /// describes the master after the locator is rewritten to a derivative.
    pub const FIXITY_SHA256: &str = "fixity_sha256";
    /// Client-declared metadata blob from the submission manifest.
    pub const ORIGINAL_METADATA: &str = "original_metadata";
    /// Grouped technical metadata extracted by the external tool.
    pub const TECHNICAL_METADATA: &str = "technical_metadata";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    /// Master path before conversion rewrote the canonical locator.
    pub const ORIGINAL_FILE_PATH: &str = "original_file_path";
    pub const CONVERSION_METHOD: &str = "conversion_method";
    pub const ERROR_MESSAGE: &str = "error_message";

    /// Internal/opaque keys never surfaced as descriptive manifest pairs.
    pub const SUPPRESSED: &[&str] = &[ORIGINAL_METADATA, TECHNICAL_METADATA];
}

/// Asset lifecycle status.
///
/// Transitions: Processing -> Ready, Processing -> Error. Ready re-enters
/// Processing only when a conversion is explicitly (re)enqueued. Nothing
/// transitions out of Error except an external retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Processing,
    Ready,
    Error,
}

impl Display for AssetStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AssetStatus::Processing => write!(f, "processing"),
            AssetStatus::Ready => write!(f, "ready"),
            AssetStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for AssetStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(AssetStatus::Processing),
            "ready" => Ok(AssetStatus::Ready),
            "error" => Ok(AssetStatus::Error),
            _ => Err(anyhow::anyhow!("Invalid asset status: {}", s)),
        }
    }
}

/// A registry record: the single source of truth for an asset's identity,
/// canonical storage location, size, status, and open metadata map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct Asset {
    pub id: Uuid,
    /// Display name: the filename as originally submitted.
    pub filename: String,
    /// Canonical storage locator. Rewritten by conversion; whenever status
    /// is Ready this resolves to an existing readable file.
    pub file_path: String,
    pub file_size: i64,
    pub content_type: String,
    pub status: AssetStatus,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    /// Borrow the metadata map as an object, when present and an object.
    pub fn metadata_object(&self) -> Option<&Map<String, JsonValue>> {
        self.metadata.as_ref().and_then(|v| v.as_object())
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata_object()
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
    }

    pub fn meta_u32(&self, key: &str) -> Option<u32> {
        self.metadata_object()
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_u64())
            .and_then(|n| u32::try_from(n).ok())
    }

    /// Extracted or derivative raster dimensions, when both are known and
    /// positive. Zero means "could not be extracted" and counts as absent.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.meta_u32(meta::WIDTH), self.meta_u32(meta::HEIGHT)) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }

    /// Master path recorded before a conversion rewrote the locator, when it
    /// differs from the current canonical path.
    pub fn original_master_path(&self) -> Option<&str> {
        self.meta_str(meta::ORIGINAL_FILE_PATH)
            .filter(|p| *p != self.file_path)
    }

    /// Insert or replace a metadata entry, creating the map if needed.
    pub fn set_meta(&mut self, key: &str, value: JsonValue) {
        match self.metadata.as_mut().and_then(|v| v.as_object_mut()) {
            Some(map) => {
                map.insert(key.to_string(), value);
            }
            None => {
                let mut map = Map::new();
                map.insert(key.to_string(), value);
                self.metadata = Some(JsonValue::Object(map));
            }
        }
    }

    /// Filename component of the current canonical locator. Tracks
    /// conversion-driven renames, unlike `filename`.
    pub fn current_storage_filename(&self) -> &str {
        std::path::Path::new(&self.file_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.filename)
    }
}

/// Fields for a registry insert. The id and creation timestamp are assigned
/// by the registry.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub content_type: String,
    pub status: AssetStatus,
    pub metadata: Option<JsonValue>,
}

/// Response body for a successful ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub status: AssetStatus,
    pub asset_id: Uuid,
    pub fixity_check: String,
    pub sha256: String,
    pub file_size: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn asset_with_metadata(metadata: Option<JsonValue>) -> Asset {
        Asset {
            id: Uuid::new_v4(),
            filename: "scroll.psb".to_string(),
            file_path: "uploads/scroll.tif".to_string(),
            file_size: 42,
            content_type: "image/tiff".to_string(),
            status: AssetStatus::Ready,
            metadata,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn dimensions_require_both_positive() {
        let asset = asset_with_metadata(Some(json!({"width": 800, "height": 600})));
        assert_eq!(asset.dimensions(), Some((800, 600)));

        let asset = asset_with_metadata(Some(json!({"width": 0, "height": 600})));
        assert_eq!(asset.dimensions(), None);

        let asset = asset_with_metadata(None);
        assert_eq!(asset.dimensions(), None);
    }

    #[test]
    fn original_master_path_must_differ_from_locator() {
        let asset = asset_with_metadata(Some(json!({
            "original_file_path": "uploads/scroll.psb"
        })));
        assert_eq!(asset.original_master_path(), Some("uploads/scroll.psb"));

        let asset = asset_with_metadata(Some(json!({
            "original_file_path": "uploads/scroll.tif"
        })));
        assert_eq!(asset.original_master_path(), None);
    }

    #[test]
    fn set_meta_creates_map_when_absent() {
        let mut asset = asset_with_metadata(None);
        asset.set_meta(meta::ERROR_MESSAGE, json!("decode failed"));
        assert_eq!(asset.meta_str(meta::ERROR_MESSAGE), Some("decode failed"));
    }

    #[test]
    fn current_storage_filename_tracks_locator() {
        let asset = asset_with_metadata(None);
        assert_eq!(asset.current_storage_filename(), "scroll.tif");
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [AssetStatus::Processing, AssetStatus::Ready, AssetStatus::Error] {
            let parsed: AssetStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
