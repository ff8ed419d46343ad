use crate::{StorageError, StorageResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tessella_core::constants::INGEST_CHUNK_SIZE;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// Name of the staging directory inside the store root. Staged files live on
/// the same filesystem as their canonical location so promotion is a rename.
const STAGING_DIR: &str = ".staging";

/// A fully written staging file awaiting verification.
///
/// Holds the computed digest and byte count from the streamed write. Either
/// `promote` or `discard` must be called; a staged file is never visible at a
/// canonical location.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    pub sha256_hex: String,
    pub bytes_written: u64,
}

/// Local filesystem storage rooted at the configured upload directory.
#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
    staging: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`, creating the root and staging
    /// directories if needed.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        let staging = root.join(STAGING_DIR);

        fs::create_dir_all(&staging).await.map_err(|e| {
            StorageError::Config(format!(
                "Failed to create storage directory {}: {}",
                staging.display(),
                e
            ))
        })?;

        Ok(LocalStore { root, staging })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reject names that could resolve outside the store root.
    fn sanitize_filename(filename: &str) -> StorageResult<&str> {
        if filename.is_empty()
            || filename.contains("..")
            || filename.contains('/')
            || filename.contains('\\')
            || filename.starts_with('.')
        {
            return Err(StorageError::InvalidFilename(format!(
                "Filename contains invalid characters: {:?}",
                filename
            )));
        }
        Ok(filename)
    }

    /// Canonical path for a stored filename, after sanitization.
    pub fn path_for(&self, filename: &str) -> StorageResult<PathBuf> {
        Ok(self.root.join(Self::sanitize_filename(filename)?))
    }

    /// Stream a reader into a fresh staging file in fixed-size chunks while
    /// computing SHA-256 over the bytes. The payload is never buffered whole.
    ///
    /// A partial staging file is removed before the error is returned.
    pub async fn stage_stream<R>(&self, reader: &mut R) -> StorageResult<StagedFile>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = self.staging.join(format!("{}.tmp", Uuid::new_v4()));

        match Self::write_staged(&path, reader).await {
            Ok((sha256_hex, bytes_written)) => {
                tracing::debug!(
                    path = %path.display(),
                    size_bytes = bytes_written,
                    sha256 = %sha256_hex,
                    "Staged upload stream"
                );
                Ok(StagedFile {
                    path,
                    sha256_hex,
                    bytes_written,
                })
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&path).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            path = %path.display(),
                            error = %cleanup,
                            "Failed to remove partial staging file"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn write_staged<R>(path: &Path, reader: &mut R) -> StorageResult<(String, u64)>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut file = fs::File::create(path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; INGEST_CHUNK_SIZE];
        let mut total: u64 = 0;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).await?;
            total += n as u64;
        }

        file.sync_all().await?;

        Ok((hex::encode(hasher.finalize()), total))
    }

    /// Promote a verified staging file to its canonical location, replacing
    /// any existing file with the same name.
    pub async fn promote(&self, staged: StagedFile, filename: &str) -> StorageResult<PathBuf> {
        let dest = self.path_for(filename)?;

        fs::rename(&staged.path, &dest).await?;

        tracing::info!(
            path = %dest.display(),
            size_bytes = staged.bytes_written,
            "Promoted staged file to canonical location"
        );

        Ok(dest)
    }

    /// Remove a staging file that failed verification.
    pub async fn discard(&self, staged: StagedFile) -> StorageResult<()> {
        match fs::remove_file(&staged.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    /// Remove a stored file. Missing files are not an error so that record
    /// deletion can proceed against an already-divergent store.
    pub async fn remove(&self, path: &Path) -> StorageResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Removed stored file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HELLO_SHA256: &str = "7509e5bda0c762d2bac7f90d758b5b2263fa01ccbc542ab5e3df163be08e6ca9";

    #[tokio::test]
    async fn stage_computes_streaming_digest() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        let mut reader = std::io::Cursor::new(b"hello world!".to_vec());
        let staged = store.stage_stream(&mut reader).await.unwrap();

        assert_eq!(staged.sha256_hex, HELLO_SHA256);
        assert_eq!(staged.bytes_written, 12);
    }

    #[tokio::test]
    async fn promote_moves_file_to_canonical_location() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        let mut reader = std::io::Cursor::new(b"hello world!".to_vec());
        let staged = store.stage_stream(&mut reader).await.unwrap();
        let dest = store.promote(staged, "greeting.txt").await.unwrap();

        assert_eq!(fs::read(&dest).await.unwrap(), b"hello world!");
        // Staging directory is empty again.
        let mut entries = fs::read_dir(dir.path().join(STAGING_DIR)).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn promote_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        let mut first = std::io::Cursor::new(b"old contents".to_vec());
        let staged = store.stage_stream(&mut first).await.unwrap();
        store.promote(staged, "asset.bin").await.unwrap();

        let mut second = std::io::Cursor::new(b"new contents".to_vec());
        let staged = store.stage_stream(&mut second).await.unwrap();
        let dest = store.promote(staged, "asset.bin").await.unwrap();

        assert_eq!(fs::read(&dest).await.unwrap(), b"new contents");
    }

    #[tokio::test]
    async fn discard_removes_staging_file() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        let mut reader = std::io::Cursor::new(b"doomed".to_vec());
        let staged = store.stage_stream(&mut reader).await.unwrap();
        store.discard(staged).await.unwrap();

        let mut entries = fs::read_dir(dir.path().join(STAGING_DIR)).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        for name in ["../escape.txt", "a/b.txt", "..", ".hidden", ""] {
            assert!(matches!(
                store.path_for(name),
                Err(StorageError::InvalidFilename(_))
            ));
        }
    }

    #[tokio::test]
    async fn remove_missing_file_is_ok() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        let path = store.path_for("nonexistent.bin").unwrap();
        assert!(store.remove(&path).await.is_ok());
    }
}
