use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tessella_core::{AppError, Asset, NewAsset};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::AssetRegistry;

/// In-process registry backend. Backs tests and single-process development
/// deployments; records are kept in creation order so paging matches the
/// Postgres backend.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    assets: Arc<RwLock<Vec<Asset>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetRegistry for MemoryRegistry {
    async fn create(&self, new_asset: NewAsset) -> Result<Asset, AppError> {
        let asset = Asset {
            id: Uuid::new_v4(),
            filename: new_asset.filename,
            file_path: new_asset.file_path,
            file_size: new_asset.file_size,
            content_type: new_asset.content_type,
            status: new_asset.status,
            metadata: new_asset.metadata,
            created_at: Utc::now(),
        };

        self.assets.write().await.push(asset.clone());
        Ok(asset)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Asset>, AppError> {
        let assets = self.assets.read().await;
        Ok(assets.iter().find(|a| a.id == id).cloned())
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Asset>, AppError> {
        let assets = self.assets.read().await;
        let offset = usize::try_from(offset.max(0)).unwrap_or(0);
        let limit = usize::try_from(limit.max(0)).unwrap_or(0);
        Ok(assets.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn update(&self, asset: &Asset) -> Result<(), AppError> {
        let mut assets = self.assets.write().await;
        match assets.iter_mut().find(|a| a.id == asset.id) {
            Some(existing) => {
                *existing = asset.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Asset {}", asset.id))),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut assets = self.assets.write().await;
        let before = assets.len();
        assets.retain(|a| a.id != id);
        Ok(assets.len() < before)
    }

    async fn count(&self) -> Result<i64, AppError> {
        Ok(self.assets.read().await.len() as i64)
    }
}
