//! Read-side asset operations plus deletion.
//!
//! Deletion removes physical files best-effort: a failure to remove a file
//! is logged but never blocks deleting the registry row, so a divergent
//! store cannot produce undeletable records.

use std::path::Path;
use std::sync::Arc;
use tessella_core::{AppError, Asset};
use tessella_registry::AssetRegistry;
use tessella_storage::LocalStore;
use uuid::Uuid;

pub struct AssetService {
    registry: Arc<dyn AssetRegistry>,
    store: LocalStore,
}

impl AssetService {
    pub fn new(registry: Arc<dyn AssetRegistry>, store: LocalStore) -> Self {
        Self { registry, store }
    }

    pub async fn get(&self, id: Uuid) -> Result<Asset, AppError> {
        self.registry
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset {}", id)))
    }

    pub async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Asset>, AppError> {
        self.registry.list(offset, limit).await
    }

    /// Delete the registry row and, best-effort, the asset's files (current
    /// canonical file plus the retained original master, when distinct).
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let asset = self.get(id).await?;

        self.remove_file_best_effort(&asset, &asset.file_path).await;
        if let Some(original) = asset.original_master_path() {
            self.remove_file_best_effort(&asset, original).await;
        }

        if !self.registry.delete(id).await? {
            return Err(AppError::NotFound(format!("Asset {}", id)));
        }

        tracing::info!(asset_id = %id, "Asset deleted");
        Ok(())
    }

    async fn remove_file_best_effort(&self, asset: &Asset, path: &str) {
        if let Err(e) = self.store.remove(Path::new(path)).await {
            tracing::warn!(
                asset_id = %asset.id,
                path = %path,
                error = %e,
                "Failed to remove file during delete; registry row will be removed anyway"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessella_core::{AssetStatus, NewAsset};
    use tessella_registry::MemoryRegistry;

    #[tokio::test]
    async fn delete_removes_row_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();
        let registry = Arc::new(MemoryRegistry::new());

        let master = dir.path().join("a.psb");
        let derivative = dir.path().join("a.tif");
        tokio::fs::write(&master, b"m").await.unwrap();
        tokio::fs::write(&derivative, b"d").await.unwrap();

        let asset = registry
            .create(NewAsset {
                filename: "a.psb".to_string(),
                file_path: derivative.to_string_lossy().into_owned(),
                file_size: 1,
                content_type: "image/tiff".to_string(),
                status: AssetStatus::Ready,
                metadata: Some(json!({
                    "original_file_path": master.to_string_lossy(),
                })),
            })
            .await
            .unwrap();

        let service = AssetService::new(registry.clone(), store);
        service.delete(asset.id).await.unwrap();

        assert!(!master.exists());
        assert!(!derivative.exists());
        assert_eq!(registry.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_proceeds_when_file_already_gone() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();
        let registry = Arc::new(MemoryRegistry::new());

        let asset = registry
            .create(NewAsset {
                filename: "gone.tif".to_string(),
                file_path: dir
                    .path()
                    .join("gone.tif")
                    .to_string_lossy()
                    .into_owned(),
                file_size: 1,
                content_type: "image/tiff".to_string(),
                status: AssetStatus::Ready,
                metadata: None,
            })
            .await
            .unwrap();

        let service = AssetService::new(registry.clone(), store);
        service.delete(asset.id).await.unwrap();
        assert_eq!(registry.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();
        let service = AssetService::new(Arc::new(MemoryRegistry::new()), store);

        assert!(matches!(
            service.get(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
