//! Preservation Exporter: self-verifying BagIt-style packages.
//!
//! A package pairs the asset's payload files (the current canonical file
//! plus the retained original master, when distinct and still present) with
//! a per-file checksum manifest, a fixed declaration file, and an info file,
//! all assembled under a scratch directory that is removed on success and
//! failure alike, then packed into one gzip-compressed tar archive with
//! paths relative to the bag root.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessella_core::constants::{BAGIT_VERSION, INGEST_CHUNK_SIZE, TAG_FILE_ENCODING};
use tessella_core::{meta, AppError, Asset};
use tessella_registry::AssetRegistry;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

/// A produced archive: suggested download filename plus the archive bytes.
#[derive(Debug)]
pub struct ExportArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// One payload file scheduled for the bag.
struct PayloadFile {
    source: PathBuf,
    /// Filename inside `data/`.
    name: String,
    /// Digest known ahead of time (the ingest-time fixity digest for the
    /// master); computed from the bytes otherwise.
    known_digest: Option<String>,
}

pub struct Exporter {
    registry: Arc<dyn AssetRegistry>,
    source_organization: String,
}

impl Exporter {
    pub fn new(registry: Arc<dyn AssetRegistry>, source_organization: impl Into<String>) -> Self {
        Self {
            registry,
            source_organization: source_organization.into(),
        }
    }

    /// Assemble and return the preservation package for an asset.
    ///
    /// Fails with NotFound or PhysicalFileMissing before any scratch work
    /// begins.
    #[tracing::instrument(skip(self))]
    pub async fn export(&self, asset_id: Uuid) -> Result<ExportArtifact, AppError> {
        let asset = self
            .registry
            .get_by_id(asset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset {}", asset_id)))?;

        let current = PathBuf::from(&asset.file_path);
        if !tokio::fs::try_exists(&current).await.unwrap_or(false) {
            return Err(AppError::PhysicalFileMissing(asset.file_path.clone()));
        }

        let payload = self.collect_payload(&asset, current).await;

        // Scratch lives only as long as this call; TempDir removes it on
        // every exit path.
        let scratch = tempfile::TempDir::new()
            .map_err(|e| AppError::Export(format!("Failed to create scratch directory: {}", e)))?;

        let artifact = self
            .assemble(&asset, &payload, scratch.path())
            .await
            .map_err(|e| match e {
                AppError::Export(_) => e,
                other => AppError::Export(other.to_string()),
            })?;

        tracing::info!(
            asset_id = %asset.id,
            archive = %artifact.filename,
            payload_files = payload.len(),
            "Export complete"
        );

        Ok(artifact)
    }

    async fn collect_payload(&self, asset: &Asset, current: PathBuf) -> Vec<PayloadFile> {
        let stored_fixity = asset.meta_str(meta::FIXITY_SHA256).map(String::from);
        let original = asset.original_master_path().map(PathBuf::from);

        let mut payload = Vec::new();

        // The stored fixity digest describes the original master. When no
        // conversion happened the current file *is* the master.
        payload.push(PayloadFile {
            name: file_name_of(&current),
            known_digest: if original.is_none() {
                stored_fixity.clone()
            } else {
                None
            },
            source: current,
        });

        if let Some(original) = original {
            if tokio::fs::try_exists(&original).await.unwrap_or(false) {
                payload.push(PayloadFile {
                    name: file_name_of(&original),
                    known_digest: stored_fixity,
                    source: original,
                });
            } else {
                tracing::warn!(
                    asset_id = %asset.id,
                    path = %original.display(),
                    "Recorded original master is missing; exporting without it"
                );
            }
        }

        payload
    }

    async fn assemble(
        &self,
        asset: &Asset,
        payload: &[PayloadFile],
        bag_root: &Path,
    ) -> Result<ExportArtifact, AppError> {
        let data_dir = bag_root.join("data");
        tokio::fs::create_dir_all(&data_dir).await?;

        let mut manifest_lines = Vec::with_capacity(payload.len());
        let mut payload_bytes: u64 = 0;

        for file in payload {
            let dest = data_dir.join(&file.name);
            tokio::fs::copy(&file.source, &dest).await?;
            payload_bytes += tokio::fs::metadata(&dest).await?.len();

            let digest = match &file.known_digest {
                Some(digest) => digest.clone(),
                None => sha256_file(&dest).await?,
            };
            manifest_lines.push(format!("{}  data/{}", digest, file.name));
        }

        // Deterministic manifest ordering: export of an unchanged asset is
        // byte-identical, bagging date aside.
        manifest_lines.sort();

        let checksum_manifest = format!("{}\n", manifest_lines.join("\n"));
        tokio::fs::write(bag_root.join("manifest-sha256.txt"), &checksum_manifest).await?;

        let declaration = format!(
            "BagIt-Version: {}\nTag-File-Character-Encoding: {}\n",
            BAGIT_VERSION, TAG_FILE_ENCODING
        );
        tokio::fs::write(bag_root.join("bagit.txt"), &declaration).await?;

        let mut info = String::new();
        info.push_str(&format!(
            "Source-Organization: {}\n",
            self.source_organization
        ));
        info.push_str(&format!(
            "Bagging-Date: {}\n",
            chrono::Utc::now().format("%Y-%m-%d")
        ));
        info.push_str(&format!(
            "Payload-Oxum: {}.{}\n",
            payload_bytes,
            payload.len()
        ));
        info.push_str(&format!("Bag-Size: {}\n", format_size(payload_bytes)));
        if let Some(original) = asset.original_master_path() {
            info.push_str(&format!(
                "Original-File: data/{}\n",
                file_name_of(Path::new(original))
            ));
        }
        tokio::fs::write(bag_root.join("bag-info.txt"), &info).await?;

        // tar + gzip are synchronous; pack on the blocking pool.
        let root = bag_root.to_path_buf();
        let entries: Vec<String> = ["bagit.txt", "bag-info.txt", "manifest-sha256.txt"]
            .into_iter()
            .map(String::from)
            .chain(payload.iter().map(|f| format!("data/{}", f.name)))
            .collect();

        let bytes = tokio::task::spawn_blocking(move || pack_archive(&root, &entries))
            .await
            .map_err(|e| AppError::Export(format!("Archive task failed: {}", e)))??;

        Ok(ExportArtifact {
            filename: format!("{}-bag.tar.gz", asset.id),
            bytes,
        })
    }
}

fn pack_archive(root: &Path, entries: &[String]) -> Result<Vec<u8>, AppError> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in entries {
        builder
            .append_path_with_name(root.join(entry), entry)
            .map_err(|e| AppError::Export(format!("Failed to add {} to archive: {}", entry, e)))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| AppError::Export(format!("Failed to finish archive: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| AppError::Export(format!("Failed to compress archive: {}", e)))
}

/// Streaming SHA-256 of a file on disk.
async fn sha256_file(path: &Path) -> Result<String, AppError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; INGEST_CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
